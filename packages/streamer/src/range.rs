//! Block Range Resolution
//!
//! Converts the positional `<start_block> [<end_block>]` arguments into a
//! concrete [`BlockRange`]. Negative starts are relative to the chain tip and
//! are resolved by the remote service, not here.

use std::fmt;

use crate::config::ConfigError;

/// Block boundaries requested for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockRange {
    /// Absolute start block, or a negative offset from the chain tip
    pub start: i64,
    /// Inclusive stop block; `None` streams forever
    pub end: Option<u64>,
}

impl BlockRange {
    /// Resolve a range from zero, one or two positional arguments
    ///
    /// # Arguments
    /// * `args` - The positional arguments following the filter expression
    ///
    /// # Returns
    /// The parsed range, or `ConfigError::InvalidArgument` when a value does not
    /// parse or when `start >= end`
    pub fn resolve<S: AsRef<str>>(args: &[S]) -> Result<Self, ConfigError> {
        if args.len() > 2 {
            return Err(ConfigError::InvalidArgument(format!(
                "expecting at most 2 range arguments, got {}",
                args.len()
            )));
        }

        let mut range = BlockRange::default();

        let Some(start) = args.first().map(AsRef::as_ref) else {
            return Ok(range);
        };
        range.start = start.parse::<i64>().map_err(|_| {
            ConfigError::InvalidArgument(format!(
                "the <range> start value {start:?} is not a valid int64 value"
            ))
        })?;

        let Some(end) = args.get(1).map(AsRef::as_ref) else {
            return Ok(range);
        };
        let end_value = end.parse::<u64>().map_err(|_| {
            ConfigError::InvalidArgument(format!(
                "the <range> end value {end:?} is not a valid uint64 value"
            ))
        })?;

        // A negative start always precedes an absolute end.
        if range.start >= 0 && range.start as u64 >= end_value {
            return Err(ConfigError::InvalidArgument(format!(
                "the <range> start value {start:?} comes after end value {end:?}"
            )));
        }
        range.end = Some(end_value);

        Ok(range)
    }

    /// Stop block as sent on the wire, `0` meaning unbounded
    pub fn stop_block_num(&self) -> u64 {
        self.end.unwrap_or(0)
    }

    /// Range rendered without whitespace, used for `{range}` output paths
    pub fn compact(&self) -> String {
        self.to_string().replace(' ', "")
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.stop_block_num())
    }
}
