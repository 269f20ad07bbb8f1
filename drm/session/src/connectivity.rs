use core::fmt;

/**
    Kind of network the device is currently attached to.
*/
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    #[default]
    Disconnected,
    Cellular,
    Wifi,
}

impl NetworkKind {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Cellular | Self::Wifi)
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Cellular => "cellular",
            Self::Wifi => "wifi",
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

/**
    Connectivity probe supplied by the embedding application.
*/
pub trait Connectivity: Send + Sync {
    fn network(&self) -> NetworkKind;
}

impl Connectivity for NetworkKind {
    fn network(&self) -> NetworkKind {
        *self
    }
}

impl<F> Connectivity for F
where
    F: Fn() -> NetworkKind + Send + Sync,
{
    fn network(&self) -> NetworkKind {
        self()
    }
}
