/// Errors raised by the bar model and the tempo clock
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("tempo must be a positive number of beats per minute (got {0})")]
    InvalidTempo(f64),

    #[error("subdivision must be one of 1, 2, 4, 8, 16 or 32 (got {0})")]
    InvalidSubdivision(u32),

    #[error("a bar needs at least one beat")]
    InvalidBeats,

    #[error("a bar must be played at least once")]
    InvalidRepeat,

    #[error("a sequence needs at least one bar")]
    EmptySequence,

    #[error("the last remaining bar cannot be removed")]
    LastBar,

    #[error("no bar at index {index} (sequence has {len})")]
    BarIndex { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
