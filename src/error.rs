use std::error;
use std::fmt;




#[derive(Debug)]


/**
 * Error to represent an inconsistent particle registry, an invalid request
 * made by a species, or a failure of the accretion / feedback machinery.
 * Every variant is fatal to the run; recoverable conditions (degenerate
 * radius, no active particles) never produce an error.
 */
pub enum Error {
    DuplicateSpecies(String),
    UnknownSpecies(String),
    SpeciesEnabledTwice(String),
    CapacityOverflow { capacity: usize },
    MissingFormationData(&'static str),
    MissingField(&'static str),
    NegativeMassDensity(f64),
    NonFiniteRadius(f64),
    EmptyLevel(usize),
    UnknownGrid(u64),
    InvalidRank { rank: usize, size: usize },
    InvalidGrid(String),
    InvalidParameter { line: usize, message: String },
    Transport(String),
    Checkpoint(String),
    Feedback {
        species: String,
        level: usize,
        radius: Option<f64>,
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;




// ============================================================================
impl Error {

    /**
     * Attach the species and level of a failed feedback invocation, and the
     * influence radius of the source when there is one.
     */
    pub fn in_feedback(self, species: &str, level: usize, radius: Option<f64>) -> Self {
        Error::Feedback {
            species: species.to_string(),
            level,
            radius,
            source: Box::new(self),
        }
    }
}




// ============================================================================
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;

        match self {
            DuplicateSpecies(name) => write!(fmt, "particle species {} registered twice", name),
            UnknownSpecies(name) => write!(fmt, "unknown particle species: {}", name),
            SpeciesEnabledTwice(name) => write!(fmt, "setting particle ID twice (species {})", name),
            CapacityOverflow { capacity } => write!(fmt, "new particle count exceeds reserved capacity {}", capacity),
            MissingFormationData(what) => write!(fmt, "formation data {} was not requested", what),
            MissingField(what) => write!(fmt, "grid does not hold the {} field", what),
            NegativeMassDensity(d) => write!(fmt, "negative mass density: {}", d),
            NonFiniteRadius(r) => write!(fmt, "non-finite influence radius: {}", r),
            EmptyLevel(level) => write!(fmt, "no grids on level {}", level),
            UnknownGrid(id) => write!(fmt, "no grid with id {}", id),
            InvalidRank { rank, size } => write!(fmt, "rank {} is outside a group of {}", rank, size),
            InvalidGrid(message) => write!(fmt, "invalid grid: {}", message),
            InvalidParameter { line, message } => write!(fmt, "parameter line {}: {}", line, message),
            Transport(message) => write!(fmt, "transport: {}", message),
            Checkpoint(message) => write!(fmt, "checkpoint: {}", message),
            Feedback { species, level, radius: Some(radius), source } => write!(
                fmt,
                "accretion/feedback failed for species {} on level {} (radius {:e}): {}",
                species, level, radius, source),
            Feedback { species, level, radius: None, source } => write!(
                fmt,
                "feedback failed for species {} on level {}: {}",
                species, level, source),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Feedback { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
