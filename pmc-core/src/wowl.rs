//! Wake-on-WLAN parameters carried by the enter/exit WOWL commands.

use heapless::Vec;

/// Maximum number of wake patterns programmed at once.
pub const MAX_WOWL_PATTERNS: usize = 2;
/// Maximum pattern length in bytes.
pub const MAX_PATTERN_LEN: usize = 16;
/// Mask bytes needed to cover [`MAX_PATTERN_LEN`] pattern bytes.
pub const MAX_MASK_LEN: usize = MAX_PATTERN_LEN / 8;

/// A byte pattern matched against received frames.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WowlPattern {
    /// Offset into the frame body where matching starts.
    pub offset: u8,
    pub bytes: Vec<u8, MAX_PATTERN_LEN>,
    /// One bit per pattern byte; set bits take part in the match.
    pub mask: Vec<u8, MAX_MASK_LEN>,
}

impl WowlPattern {
    /// Builds a pattern whose every byte is significant.
    pub fn exact(offset: u8, bytes: &[u8]) -> Result<Self, WowlParamsError> {
        let bytes = Vec::from_slice(bytes).map_err(|_| WowlParamsError::PatternTooLong)?;
        let mut mask = Vec::new();
        let mut remaining = bytes.len();
        while remaining > 0 {
            let bits = remaining.min(8);
            let byte = if bits == 8 { 0xFF } else { (1u8 << bits) - 1 };
            mask.push(byte).map_err(|_| WowlParamsError::PatternTooLong)?;
            remaining -= bits;
        }
        Ok(Self {
            offset,
            bytes,
            mask,
        })
    }
}

/// Parameters for entering WOWL.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WowlEnterParams {
    pub magic_packet: bool,
    pub patterns: Vec<WowlPattern, MAX_WOWL_PATTERNS>,
}

/// Encoded size upper bound of [`WowlEnterParams`].
pub const WOWL_PARAMS_MAX_LEN: usize =
    2 + MAX_WOWL_PATTERNS * (3 + MAX_PATTERN_LEN + MAX_MASK_LEN);

impl WowlEnterParams {
    /// Parameters that wake only on the magic packet.
    #[must_use]
    pub fn magic_packet() -> Self {
        Self {
            magic_packet: true,
            patterns: Vec::new(),
        }
    }

    /// Appends a wake pattern.
    pub fn with_pattern(mut self, pattern: WowlPattern) -> Result<Self, WowlParamsError> {
        self.patterns
            .push(pattern)
            .map_err(|_| WowlParamsError::TooManyPatterns)?;
        Ok(self)
    }

    /// Serializes the parameters as
    /// `[magic, count, (offset, len, mask_len, bytes.., mask..)*]`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8, WOWL_PARAMS_MAX_LEN> {
        let mut out: Vec<u8, WOWL_PARAMS_MAX_LEN> = Vec::new();
        let header = [u8::from(self.magic_packet), count_u8(self.patterns.len())];
        // Capacity covers the largest possible parameter set.
        let _ = out.extend_from_slice(&header);
        for pattern in &self.patterns {
            let _ = out.extend_from_slice(&[
                pattern.offset,
                count_u8(pattern.bytes.len()),
                count_u8(pattern.mask.len()),
            ]);
            let _ = out.extend_from_slice(&pattern.bytes);
            let _ = out.extend_from_slice(&pattern.mask);
        }
        out
    }
}

/// Parameters for leaving WOWL.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct WowlExitParams {
    /// Drop programmed patterns on exit instead of keeping them for the next entry.
    pub clear_patterns: bool,
}

/// Errors building WOWL parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WowlParamsError {
    TooManyPatterns,
    PatternTooLong,
}

impl core::fmt::Display for WowlParamsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WowlParamsError::TooManyPatterns => {
                write!(f, "at most {MAX_WOWL_PATTERNS} wake patterns")
            }
            WowlParamsError::PatternTooLong => {
                write!(f, "wake patterns are limited to {MAX_PATTERN_LEN} bytes")
            }
        }
    }
}

fn count_u8(len: usize) -> u8 {
    u8::try_from(len).unwrap_or(u8::MAX)
}
