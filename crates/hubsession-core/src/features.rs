//! Capability feature negotiation
//!
//! Hubs and users announce optional protocol features as lists of short
//! tokens. A [`Vocabulary`] maps each known token to a bit in one of two
//! masks (the primary flags and a secondary "known supports" vector), and a
//! [`FeatureNegotiator`] encodes a [`CapabilitySet`] into an order-stable
//! token list and decodes a peer's list back into bits.
//!
//! Decoding never fails. Tokens outside the vocabulary are collected in
//! [`DecodedFeatures::unknown`], logged, and otherwise ignored.

use core::fmt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Dialect;

// ----------------------------------------------------------------------------
// Feature Bits
// ----------------------------------------------------------------------------

/// ADC user features announced in the `SU` field of a user record
pub mod user_flags {
    pub const TCP4: u32 = 0x01;
    pub const UDP4: u32 = 0x02;
    pub const TCP6: u32 = 0x04;
    pub const UDP6: u32 = 0x08;
    /// Secure client-client connections (ADCS)
    pub const ADCS: u32 = 0x10;
    pub const NAT_TRAVERSAL: u32 = 0x20;
    /// Client-client private messages
    pub const CCPM: u32 = 0x40;

    /// Known supports, secondary vector
    pub const SEGMENTED_FILES: u32 = 0x01;
}

/// ADC hub features announced with `SUP`
pub mod adc_hub_flags {
    pub const BASE: u32 = 0x01;
    /// Pre-release spelling of BASE still sent by older hubs
    pub const BAS0: u32 = 0x02;
    pub const TIGR: u32 = 0x04;
    pub const USER_COMMANDS: u32 = 0x08;
    pub const BLOOM: u32 = 0x10;
    pub const ZLIB: u32 = 0x20;
}

/// NMDC hub features announced with `$Supports`
pub mod nmdc_hub_flags {
    pub const USER_COMMAND: u32 = 0x01;
    pub const NO_GET_INFO: u32 = 0x02;
    pub const USER_IP2: u32 = 0x04;
    pub const EXT_JSON2: u32 = 0x08;
    pub const NICK_RULE: u32 = 0x10;
    pub const TTHS: u32 = 0x20;
    pub const SEARCH_RULE: u32 = 0x40;

    pub const NO_HELLO: u32 = 0x01;
    pub const TTH_SEARCH: u32 = 0x02;
    pub const ZPIPE0: u32 = 0x04;
    pub const HUB_URL: u32 = 0x08;
    pub const HUB_TOPIC: u32 = 0x10;
    pub const TLS: u32 = 0x20;
}

// ----------------------------------------------------------------------------
// Vocabularies
// ----------------------------------------------------------------------------

/// One wire token and the bit it stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDef {
    pub token: &'static str,
    pub bit: u32,
}

const fn def(token: &'static str, bit: u32) -> FeatureDef {
    FeatureDef { token, bit }
}

/// A token table for one direction of one dialect
#[derive(Debug, PartialEq, Eq)]
pub struct Vocabulary {
    pub name: &'static str,
    /// Separator used when encoding
    pub delimiter: char,
    pub primary: &'static [FeatureDef],
    pub extended: &'static [FeatureDef],
}

impl Vocabulary {
    /// Union of every primary bit
    pub fn known_mask(&self) -> u32 {
        self.primary.iter().fold(0, |mask, f| mask | f.bit)
    }

    /// Union of every extended bit
    pub fn known_extended_mask(&self) -> u32 {
        self.extended.iter().fold(0, |mask, f| mask | f.bit)
    }

    /// Whether `token` belongs to either table
    pub fn recognizes(&self, token: &str) -> bool {
        self.primary
            .iter()
            .chain(self.extended.iter())
            .any(|f| f.token == token)
    }
}

pub static ADC_USER: Vocabulary = Vocabulary {
    name: "adc-user",
    delimiter: ',',
    primary: &[
        def("TCP4", user_flags::TCP4),
        def("UDP4", user_flags::UDP4),
        def("TCP6", user_flags::TCP6),
        def("UDP6", user_flags::UDP6),
        def("ADC0", user_flags::ADCS),
        def("NAT0", user_flags::NAT_TRAVERSAL),
        def("CCPM", user_flags::CCPM),
    ],
    extended: &[def("SEGA", user_flags::SEGMENTED_FILES)],
};

pub static ADC_HUB: Vocabulary = Vocabulary {
    name: "adc-hub",
    delimiter: ' ',
    primary: &[
        def("ADBASE", adc_hub_flags::BASE),
        def("ADBAS0", adc_hub_flags::BAS0),
        def("ADTIGR", adc_hub_flags::TIGR),
        def("ADUCM0", adc_hub_flags::USER_COMMANDS),
        def("ADBLO0", adc_hub_flags::BLOOM),
        def("ADZLIF", adc_hub_flags::ZLIB),
    ],
    extended: &[],
};

pub static NMDC_HUB: Vocabulary = Vocabulary {
    name: "nmdc-hub",
    delimiter: ' ',
    primary: &[
        def("UserCommand", nmdc_hub_flags::USER_COMMAND),
        def("NoGetINFO", nmdc_hub_flags::NO_GET_INFO),
        def("UserIP2", nmdc_hub_flags::USER_IP2),
        def("NickRule", nmdc_hub_flags::NICK_RULE),
        def("SearchRule", nmdc_hub_flags::SEARCH_RULE),
        def("ExtJSON2", nmdc_hub_flags::EXT_JSON2),
        def("TTHS", nmdc_hub_flags::TTHS),
    ],
    extended: &[
        def("NoHello", nmdc_hub_flags::NO_HELLO),
        def("TTHSearch", nmdc_hub_flags::TTH_SEARCH),
        def("ZPipe0", nmdc_hub_flags::ZPIPE0),
        def("HubURL", nmdc_hub_flags::HUB_URL),
        def("HubTopic", nmdc_hub_flags::HUB_TOPIC),
        def("TLS", nmdc_hub_flags::TLS),
    ],
};

// ----------------------------------------------------------------------------
// Capability Set
// ----------------------------------------------------------------------------

/// Known boolean features plus the secondary known-supports vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub flags: u32,
    pub extended: u32,
}

impl CapabilitySet {
    pub fn new(flags: u32, extended: u32) -> Self {
        Self { flags, extended }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: u32) -> Self {
        self.flags |= flag;
        self
    }

    pub fn with_extended(mut self, bit: u32) -> Self {
        self.extended |= bit;
        self
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    pub fn contains_extended(&self, bit: u32) -> bool {
        self.extended & bit == bit
    }

    pub fn is_empty(&self) -> bool {
        self.flags == 0 && self.extended == 0
    }

    pub fn union(&self, other: &CapabilitySet) -> CapabilitySet {
        CapabilitySet::new(self.flags | other.flags, self.extended | other.extended)
    }

    /// Features both sides support
    pub fn intersection(&self, other: &CapabilitySet) -> CapabilitySet {
        CapabilitySet::new(self.flags & other.flags, self.extended & other.extended)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}/{:#06x}", self.flags, self.extended)
    }
}

/// Result of decoding a peer's token list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedFeatures {
    pub capabilities: CapabilitySet,
    /// Tokens outside the vocabulary, in arrival order
    pub unknown: Vec<String>,
}

// ----------------------------------------------------------------------------
// Negotiator
// ----------------------------------------------------------------------------

/// Encoder/decoder bound to one vocabulary
#[derive(Debug, Clone, Copy)]
pub struct FeatureNegotiator {
    vocabulary: &'static Vocabulary,
}

impl FeatureNegotiator {
    pub fn new(vocabulary: &'static Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn adc_user() -> Self {
        Self::new(&ADC_USER)
    }

    pub fn adc_hub() -> Self {
        Self::new(&ADC_HUB)
    }

    pub fn nmdc_hub() -> Self {
        Self::new(&NMDC_HUB)
    }

    /// Negotiator for hub-level features of a dialect
    pub fn for_hub(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Adc => Self::adc_hub(),
            Dialect::Nmdc => Self::nmdc_hub(),
        }
    }

    /// Negotiator for per-user features; NMDC users carry none as tokens
    pub fn for_users(dialect: Dialect) -> Option<Self> {
        match dialect {
            Dialect::Adc => Some(Self::adc_user()),
            Dialect::Nmdc => None,
        }
    }

    pub fn vocabulary(&self) -> &'static Vocabulary {
        self.vocabulary
    }

    /// Tokens for every set bit, primary table first, in table order.
    /// Bits outside the vocabulary produce nothing.
    pub fn tokens(&self, capabilities: &CapabilitySet) -> Vec<&'static str> {
        let primary = self
            .vocabulary
            .primary
            .iter()
            .filter(|f| capabilities.flags & f.bit != 0);
        let extended = self
            .vocabulary
            .extended
            .iter()
            .filter(|f| capabilities.extended & f.bit != 0);
        primary.chain(extended).map(|f| f.token).collect()
    }

    /// Encode into a single delimited string
    pub fn encode(&self, capabilities: &CapabilitySet) -> String {
        let mut delimiter = [0u8; 4];
        let delimiter = self.vocabulary.delimiter.encode_utf8(&mut delimiter);
        self.tokens(capabilities).join(delimiter)
    }

    /// Decode a delimited string. Both space and comma are accepted as
    /// separators regardless of the vocabulary's own delimiter.
    pub fn decode(&self, input: &str) -> DecodedFeatures {
        self.decode_tokens(input.split(|c: char| c == ',' || c.is_whitespace()))
    }

    /// Decode pre-split tokens
    pub fn decode_tokens<I, S>(&self, tokens: I) -> DecodedFeatures
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut decoded = DecodedFeatures::default();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            if let Some(f) = self.vocabulary.primary.iter().find(|f| f.token == token) {
                decoded.capabilities.flags |= f.bit;
            } else if let Some(f) = self.vocabulary.extended.iter().find(|f| f.token == token) {
                decoded.capabilities.extended |= f.bit;
            } else {
                decoded.unknown.push(token.to_string());
            }
        }
        if !decoded.unknown.is_empty() {
            debug!(
                vocabulary = self.vocabulary.name,
                unknown = ?decoded.unknown,
                "ignoring unknown feature tokens"
            );
        }
        decoded
    }
}

// ----------------------------------------------------------------------------
// Hub Feature Rules
// ----------------------------------------------------------------------------

/// Features this client announces to a hub by default
pub fn default_local_features(dialect: Dialect) -> CapabilitySet {
    match dialect {
        Dialect::Adc => CapabilitySet::empty()
            .with(adc_hub_flags::BASE)
            .with(adc_hub_flags::BAS0)
            .with(adc_hub_flags::TIGR)
            .with(adc_hub_flags::USER_COMMANDS)
            .with(adc_hub_flags::BLOOM)
            .with(adc_hub_flags::ZLIB),
        Dialect::Nmdc => CapabilitySet::new(
            NMDC_HUB.known_mask(),
            NMDC_HUB.known_extended_mask(),
        ),
    }
}

/// Outcome of checking a hub's announced features against what a session
/// needs before it can proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubFeatureCheck {
    Accepted {
        /// The hub does not hash passwords with Tiger; use the legacy scheme
        legacy_password: bool,
    },
    /// ADC hub without BASE support
    MissingBaseProtocol,
}

/// Apply the dialect's acceptance rules to decoded hub features
pub fn check_hub_features(dialect: Dialect, capabilities: &CapabilitySet) -> HubFeatureCheck {
    match dialect {
        Dialect::Adc => {
            if !capabilities.contains(adc_hub_flags::BASE)
                && !capabilities.contains(adc_hub_flags::BAS0)
            {
                return HubFeatureCheck::MissingBaseProtocol;
            }
            HubFeatureCheck::Accepted {
                legacy_password: !capabilities.contains(adc_hub_flags::TIGR),
            }
        }
        Dialect::Nmdc => HubFeatureCheck::Accepted {
            legacy_password: false,
        },
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
