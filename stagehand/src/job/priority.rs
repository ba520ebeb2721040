/// Number of priority classes a [`JobQueue`](crate::job::JobQueue) keeps
/// separate buckets for.
pub(crate) const PRIORITY_BUCKETS: usize = 5;

/// Priority class of a job. Higher classes drain first on an actor.
///
/// The raw values leave gaps between classes so that a raw priority coming
/// from elsewhere can be rounded down to the class it belongs to.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    #[default]
    Unspecified = 0x00,
    Background = 0x09,
    Utility = 0x11,
    Default = 0x15,
    UserInitiated = 0x19,
    UserInteractive = 0x21,
}

impl JobPriority {
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Maps a raw priority to the class it falls into, rounding down.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            r if r >= Self::UserInteractive.as_u8() => Self::UserInteractive,
            r if r >= Self::UserInitiated.as_u8() => Self::UserInitiated,
            r if r >= Self::Default.as_u8() => Self::Default,
            r if r >= Self::Utility.as_u8() => Self::Utility,
            r if r >= Self::Background.as_u8() => Self::Background,
            _ => Self::Unspecified,
        }
    }

    /// Index of the bucket this priority drains from. Bucket 0 drains first.
    pub(crate) fn bucket(self) -> usize {
        match self {
            Self::UserInteractive => 0,
            Self::UserInitiated => 1,
            Self::Default => 2,
            Self::Utility => 3,
            Self::Background | Self::Unspecified => 4,
        }
    }
}
