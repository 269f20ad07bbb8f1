use core::fmt;
use core::str::FromStr;

use hex_literal::hex;

use crate::error::ParseError;
use crate::utils::{format_uuid, parse_uuid, uuid_equal};

/**
    Widevine system ID: `edef8ba9-79d6-4ace-a3c8-27dcd51d21ed`
*/
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = hex!("edef8ba9 79d6 4ace a3c8 27dcd51d21ed");

/**
    PlayReady system ID: `9a04f079-9840-4286-ab92-e65be0885f95`
*/
pub const PLAYREADY_SYSTEM_ID: [u8; 16] = hex!("9a04f079 9840 4286 ab92 e65be0885f95");

/**
    Default scheme preference, most preferred first.
*/
pub const DEFAULT_PRIORITY: [ProtectionScheme; 2] =
    [ProtectionScheme::Widevine, ProtectionScheme::PlayReady];

/**
    A content protection scheme advertised by content.

    Only the schemes this player can negotiate get their own variant;
    every other system ID is carried verbatim in `Unsupported` so that
    it can still be logged and compared.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionScheme {
    Widevine,
    PlayReady,
    Unsupported([u8; 16]),
}

impl ProtectionScheme {
    /**
        Classify a raw 16-byte system ID.

        This is the only place where system IDs are compared.
    */
    pub const fn from_system_id(id: [u8; 16]) -> Self {
        if uuid_equal(&id, &WIDEVINE_SYSTEM_ID) {
            Self::Widevine
        } else if uuid_equal(&id, &PLAYREADY_SYSTEM_ID) {
            Self::PlayReady
        } else {
            Self::Unsupported(id)
        }
    }

    pub const fn system_id(self) -> [u8; 16] {
        match self {
            Self::Widevine => WIDEVINE_SYSTEM_ID,
            Self::PlayReady => PLAYREADY_SYSTEM_ID,
            Self::Unsupported(id) => id,
        }
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Widevine => "Widevine",
            Self::PlayReady => "PlayReady",
            Self::Unsupported(_) => "Unsupported",
        }
    }

    /**
        Look up a known scheme by name, case-insensitive.
        Never returns `Unsupported`.
    */
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("widevine") {
            Some(Self::Widevine)
        } else if name.eq_ignore_ascii_case("playready") {
            Some(Self::PlayReady)
        } else {
            None
        }
    }

    /**
        Returns `true` for schemes with a dedicated variant.
    */
    pub const fn is_recognized(self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }

    pub fn to_uuid(self) -> String {
        format_uuid(&self.system_id())
    }
}

impl fmt::Display for ProtectionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_name(), self.to_uuid())
    }
}

/**
    Accepts a scheme name (`widevine`, `PlayReady`) or a system ID in
    hyphenated or plain hex form.
*/
impl FromStr for ProtectionScheme {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(scheme) = Self::from_name(s) {
            return Ok(scheme);
        }
        parse_uuid(s.trim().as_bytes())
            .map(Self::from_system_id)
            .ok_or_else(|| ParseError {
                kind: "protection scheme",
                value: s.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_system_ids() {
        assert_eq!(
            ProtectionScheme::from_system_id(WIDEVINE_SYSTEM_ID),
            ProtectionScheme::Widevine
        );
        assert_eq!(
            ProtectionScheme::from_system_id(PLAYREADY_SYSTEM_ID),
            ProtectionScheme::PlayReady
        );
    }

    #[test]
    fn unknown_system_id_is_preserved() {
        // FairPlay is real but not negotiable here
        let fairplay = hex!("94ce86fb07ff4f43adb893d2fa968ca2");
        let scheme = ProtectionScheme::from_system_id(fairplay);
        assert_eq!(scheme, ProtectionScheme::Unsupported(fairplay));
        assert_eq!(scheme.system_id(), fairplay);
        assert!(!scheme.is_recognized());
    }

    #[test]
    fn display_includes_uuid() {
        assert_eq!(
            ProtectionScheme::Widevine.to_string(),
            "Widevine (edef8ba9-79d6-4ace-a3c8-27dcd51d21ed)"
        );
        assert_eq!(
            ProtectionScheme::PlayReady.to_string(),
            "PlayReady (9a04f079-9840-4286-ab92-e65be0885f95)"
        );
    }

    #[test]
    fn parses_names_and_uuids() {
        assert_eq!(
            "widevine".parse::<ProtectionScheme>().unwrap(),
            ProtectionScheme::Widevine
        );
        assert_eq!(
            " PLAYREADY ".parse::<ProtectionScheme>().unwrap(),
            ProtectionScheme::PlayReady
        );
        assert_eq!(
            "EDEF8BA9-79D6-4ACE-A3C8-27DCD51D21ED"
                .parse::<ProtectionScheme>()
                .unwrap(),
            ProtectionScheme::Widevine
        );
        assert_eq!(
            "9a04f07998404286ab92e65be0885f95"
                .parse::<ProtectionScheme>()
                .unwrap(),
            ProtectionScheme::PlayReady
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "fairplay".parse::<ProtectionScheme>().unwrap_err();
        assert_eq!(err.kind, "protection scheme");
        assert_eq!(err.value, "fairplay");
    }

    #[test]
    fn default_priority_prefers_widevine() {
        assert_eq!(DEFAULT_PRIORITY[0], ProtectionScheme::Widevine);
        assert_eq!(DEFAULT_PRIORITY[1], ProtectionScheme::PlayReady);
    }
}
