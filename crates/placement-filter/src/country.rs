//! Country codes and country sets
//!
//! Country codes follow ISO 3166-1 alpha-2. The sentinel
//! [`CountryCode::None`] stands for "unknown or unset" and is never part of
//! a set unless explicitly added.
//!
//! A [`CountrySet`] is a fixed-size bitset, so membership checks are a
//! shift and a mask with no allocation.

use placement_core::ExpressionError;
use std::fmt;

macro_rules! country_codes {
    ($($code:ident)+) => {
        /// ISO 3166-1 alpha-2 country code
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(u8)]
        pub enum CountryCode {
            /// Unknown or unset country
            #[default]
            None = 0,
            $(
                #[allow(missing_docs)]
                $code,
            )+
        }

        impl CountryCode {
            /// Every real country code in alphabetical order (excludes `None`).
            pub const ALL: &'static [CountryCode] = &[$(CountryCode::$code),+];

            /// Returns the upper-case alpha-2 code, or an empty string for `None`.
            pub const fn alpha2(self) -> &'static str {
                match self {
                    CountryCode::None => "",
                    $(CountryCode::$code => stringify!($code),)+
                }
            }
        }
    };
}

country_codes! {
    AD AE AF AG AI AL AM AO AQ AR AS AT AU AW AX AZ
    BA BB BD BE BF BG BH BI BJ BL BM BN BO BQ BR BS BT BV BW BY BZ
    CA CC CD CF CG CH CI CK CL CM CN CO CR CU CV CW CX CY CZ
    DE DJ DK DM DO DZ
    EC EE EG EH ER ES ET
    FI FJ FK FM FO FR
    GA GB GD GE GF GG GH GI GL GM GN GP GQ GR GS GT GU GW GY
    HK HM HN HR HT HU
    ID IE IL IM IN IO IQ IR IS IT
    JE JM JO JP
    KE KG KH KI KM KN KP KR KW KY KZ
    LA LB LC LI LK LR LS LT LU LV LY
    MA MC MD ME MF MG MH MK ML MM MN MO MP MQ MR MS MT MU MV MW MX MY MZ
    NA NC NE NF NG NI NL NO NP NR NU NZ
    OM
    PA PE PF PG PH PK PL PM PN PR PS PT PW PY
    QA
    RE RO RS RU RW
    SA SB SC SD SE SG SH SI SJ SK SL SM SN SO SR SS ST SV SX SY SZ
    TC TD TF TG TH TJ TK TL TM TN TO TR TT TV TW TZ
    UA UG UM US UY UZ
    VA VC VE VG VI VN VU
    WF WS
    YE YT
    ZA ZM ZW
}

/// Member states of the European Union.
pub const EU_COUNTRIES: &[CountryCode] = &[
    CountryCode::AT,
    CountryCode::BE,
    CountryCode::BG,
    CountryCode::CY,
    CountryCode::CZ,
    CountryCode::DE,
    CountryCode::DK,
    CountryCode::EE,
    CountryCode::ES,
    CountryCode::FI,
    CountryCode::FR,
    CountryCode::GR,
    CountryCode::HR,
    CountryCode::HU,
    CountryCode::IE,
    CountryCode::IT,
    CountryCode::LT,
    CountryCode::LU,
    CountryCode::LV,
    CountryCode::MT,
    CountryCode::NL,
    CountryCode::PL,
    CountryCode::PT,
    CountryCode::RO,
    CountryCode::SE,
    CountryCode::SI,
    CountryCode::SK,
];

/// EEA members that are not part of the EU.
pub const EEA_COUNTRIES_WITHOUT_EU: &[CountryCode] =
    &[CountryCode::IS, CountryCode::LI, CountryCode::NO];

impl CountryCode {
    /// Parses an alpha-2 code, ignoring case. Returns `None` for anything
    /// that is not a known code.
    pub fn from_alpha2(code: &str) -> Option<Self> {
        if code.len() != 2 {
            return None;
        }
        let upper = code.to_ascii_uppercase();
        Self::ALL
            .binary_search_by(|c| c.alpha2().cmp(upper.as_str()))
            .ok()
            .map(|ix| Self::ALL[ix])
    }

    /// Returns the code stored at a bit index of a [`CountrySet`].
    fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(CountryCode::None),
            ix => Self::ALL.get(ix - 1).copied(),
        }
    }

    /// Returns true for the `None` sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, CountryCode::None)
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountryCode::None => f.write_str("none"),
            code => f.write_str(code.alpha2()),
        }
    }
}

const WORDS: usize = 4;

/// Immutable set of country codes.
///
/// `with` and `without` return new sets and never modify the receiver.
///
/// ```
/// use placement_filter::country::{CountryCode, CountrySet};
///
/// let set = CountrySet::full().without(&[CountryCode::RU, CountryCode::BY]);
/// assert!(set.contains(CountryCode::DE));
/// assert!(!set.contains(CountryCode::RU));
/// assert!(!set.contains(CountryCode::None));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CountrySet {
    bits: [u64; WORDS],
}

impl CountrySet {
    /// Creates a set containing the given codes.
    pub fn new(codes: &[CountryCode]) -> Self {
        Self::default().with(codes)
    }

    /// Creates a set containing every real country code. `None` is not included.
    pub fn full() -> Self {
        Self::new(CountryCode::ALL)
    }

    /// Returns a new set with the given codes added.
    #[must_use]
    pub fn with(mut self, codes: &[CountryCode]) -> Self {
        for &code in codes {
            let ix = code as usize;
            self.bits[ix / 64] |= 1 << (ix % 64);
        }
        self
    }

    /// Returns a new set with the given codes removed.
    #[must_use]
    pub fn without(mut self, codes: &[CountryCode]) -> Self {
        for &code in codes {
            let ix = code as usize;
            self.bits[ix / 64] &= !(1 << (ix % 64));
        }
        self
    }

    /// Checks whether the code is in the set.
    #[inline]
    pub fn contains(&self, code: CountryCode) -> bool {
        let ix = code as usize;
        self.bits[ix / 64] & (1 << (ix % 64)) != 0
    }

    /// Number of codes in the set (including `None` if present).
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Iterates over the members, `None` first, then alphabetically.
    pub fn iter(&self) -> impl Iterator<Item = CountryCode> + '_ {
        (0..WORDS * 64)
            .filter(|ix| self.bits[ix / 64] & (1 << (ix % 64)) != 0)
            .filter_map(CountryCode::from_index)
    }

    /// Builds a set from the textual tokens accepted by `country(...)`.
    ///
    /// Tokens are case-insensitive: `all`, `*` and `any` stand for every
    /// real country, `none` for the unknown sentinel, `eu` and `eea` for the
    /// respective member lists, anything else must be an alpha-2 code.
    /// A leading `!` removes the token's codes instead of adding them. When
    /// the first token is negated the set starts from [`CountrySet::full`].
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, ExpressionError> {
        let mut set = match tokens.first() {
            Some(first) if first.as_ref().starts_with('!') => Self::full(),
            _ => Self::default(),
        };

        for token in tokens {
            let token = token.as_ref();
            let (negate, name) = match token.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let apply = |set: CountrySet, codes: &[CountryCode]| {
                if negate {
                    set.without(codes)
                } else {
                    set.with(codes)
                }
            };

            set = match name.to_ascii_lowercase().as_str() {
                "all" | "*" | "any" => apply(set, CountryCode::ALL),
                "none" => apply(set, &[CountryCode::None]),
                "eu" => apply(set, EU_COUNTRIES),
                "eea" => apply(apply(set, EU_COUNTRIES), EEA_COUNTRIES_WITHOUT_EU),
                _ => {
                    let code = CountryCode::from_alpha2(name).ok_or_else(|| {
                        ExpressionError::InvalidCountryCode {
                            code: token.to_string(),
                        }
                    })?;
                    apply(set, &[code])
                }
            };
        }

        Ok(set)
    }

    /// Renders the set as `country(...)` tokens, choosing whichever of the
    /// positive or the negated form is shorter.
    pub fn to_tokens(&self) -> Vec<String> {
        let real = self.len() - usize::from(self.contains(CountryCode::None));
        let mut tokens = Vec::new();

        if real * 2 > CountryCode::ALL.len() {
            tokens.push("all".to_string());
            tokens.extend(
                CountryCode::ALL
                    .iter()
                    .filter(|c| !self.contains(**c))
                    .map(|c| format!("!{}", c)),
            );
            if self.contains(CountryCode::None) {
                tokens.push("none".to_string());
            }
        } else {
            tokens.extend(self.iter().map(|c| c.to_string()));
        }
        tokens
    }
}

impl fmt::Debug for CountrySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<CountryCode> for CountrySet {
    fn from_iter<I: IntoIterator<Item = CountryCode>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |set, code| set.with(&[code]))
    }
}
