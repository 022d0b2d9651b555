//! Error codes shown to the player.
//!
//! The catalogue is not complete; new codes are appended as they are
//! identified. A value never changes once it has shipped.

use crate::error::ProtocolError;

macro_rules! error_messages {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)*) => {
        /// Stable numeric error codes carried by `SCErrorMsg`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum ErrorMessageType {
            $($(#[$meta])* $name = $value,)*
        }

        impl ErrorMessageType {
            /// Every known code, in catalogue order.
            pub const ALL: &'static [ErrorMessageType] = &[$(ErrorMessageType::$name,)*];

            pub const fn code(self) -> u16 {
                self as u16
            }
        }

        impl TryFrom<u16> for ErrorMessageType {
            type Error = ProtocolError;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(ErrorMessageType::$name),)*
                    other => Err(ProtocolError::malformed(
                        "error_message",
                        format!("unknown error code {other}"),
                    )),
                }
            }
        }
    };
}

error_messages! {
    NoErrorMessage = 0,
    /// The action needs a target and none was given.
    NoTarget = 1,
    InvalidTarget = 2,
    TooFarAway = 3,
    /// The caster is not the entity this connection controls.
    NotYourUnit = 4,
    CannotUseNow = 5,
    DoodadNotFound = 10,
    DoodadNotUsable = 11,
    SkillNotFound = 20,
    SkillCooldown = 21,
    NotEnoughMana = 22,
    WeaponNotEquipped = 30,
    InvalidWeaponSlot = 31,
    NoPermission = 40,
    ServerBusy = 99,
}

impl From<ErrorMessageType> for u16 {
    fn from(value: ErrorMessageType) -> Self {
        value.code()
    }
}

impl std::fmt::Display for ErrorMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
