//! Frame sequence analysis.
//!
//! Sequence numbers are assigned by the camera stack per frame, so gaps mean
//! dropped frames and decreasing arrivals mean completions were delivered out
//! of order.

use crate::traits::{CameraError, Result};

/// Drop and reorder counts for a run of sequence numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceAnalysis {
    /// Number of frames seen.
    pub frames: usize,
    /// Sequence numbers missing between the lowest and highest seen.
    pub dropped: u64,
    /// Frames that arrived after a frame with a higher sequence number.
    pub reordered: usize,
}

/// Analyze sequence numbers given in arrival order.
pub fn analyze_sequences(sequences: &[u32]) -> SequenceAnalysis {
    let mut highest: Option<u32> = None;
    let mut reordered = 0;
    for &sequence in sequences {
        match highest {
            Some(high) if sequence < high => reordered += 1,
            _ => highest = Some(sequence),
        }
    }

    let mut sorted = sequences.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let dropped = sorted
        .windows(2)
        .filter_map(|pair| match pair {
            [low, high] => Some(u64::from(high - low - 1)),
            _ => None,
        })
        .sum();

    SequenceAnalysis {
        frames: sequences.len(),
        dropped,
        reordered,
    }
}

/// Validates that sequence numbers form a contiguous run once sorted.
///
/// Arrival order does not matter; duplicates and gaps do.
///
/// # Errors
///
/// Returns `Sequence` if:
/// - The slice is empty
/// - A sequence number appears twice
/// - Any number between the lowest and highest is missing
pub fn validate_frame_sequence(sequences: &[u32]) -> Result<()> {
    if sequences.is_empty() {
        return Err(CameraError::Sequence(
            "Cannot validate empty frame sequence".to_owned(),
        ));
    }

    let mut sorted = sequences.to_vec();
    sorted.sort_unstable();

    for pair in sorted.windows(2) {
        let [prev, curr] = pair else { continue };
        if curr == prev {
            return Err(CameraError::Sequence(format!(
                "Duplicate frame sequence {curr}"
            )));
        }
        if *curr != prev + 1 {
            return Err(CameraError::Sequence(format!(
                "Frame sequence gap: expected {}, got {curr}",
                prev + 1
            )));
        }
    }

    Ok(())
}
