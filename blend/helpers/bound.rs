//! Clamps a single-column prediction file into the rating range. Useful after combo
//! runs (e.g. kNN on top of another model) whose first stage is unbounded.

use super::HelperError;
use crate::config::RatingBounds;
use crate::io::{self, PredictionFile};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundSummary {
    pub lines: usize,
    pub clipped_low: usize,
    pub clipped_high: usize,
}

enum BoundedLine<'a> {
    /// In range: the original text is kept, precision included.
    Verbatim(&'a [u8]),
    Low,
    High,
}

/// Copies `input` to `output`, replacing every value outside `bounds` by the nearer
/// bound. Each line must contain exactly one value.
pub fn bound_file(
    input: &Path,
    output: &Path,
    bounds: RatingBounds,
) -> Result<BoundSummary, HelperError> {
    bounds.validate()?;
    let file = PredictionFile::open(input)?;
    let mut bounded = Vec::new();
    let mut summary = BoundSummary {
        lines: 0,
        clipped_low: 0,
        clipped_high: 0,
    };

    for (index, line) in file.lines().enumerate() {
        let mut tokens = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|token| !token.is_empty());
        let token = match (tokens.next(), tokens.count()) {
            (Some(token), 0) => token,
            (first, rest) => {
                return Err(HelperError::MalformedLine {
                    path: input.to_path_buf(),
                    line: index + 1,
                    found: usize::from(first.is_some()) + rest,
                });
            }
        };

        let rating = io::parse_prediction(input, index + 1, token)?;
        summary.lines += 1;
        bounded.push(if rating < bounds.min {
            summary.clipped_low += 1;
            BoundedLine::Low
        } else if rating > bounds.max {
            summary.clipped_high += 1;
            BoundedLine::High
        } else {
            BoundedLine::Verbatim(token)
        });
    }

    io::write_lines_atomically(output, |writer| {
        for line in &bounded {
            match line {
                BoundedLine::Verbatim(token) => writer.write_all(token)?,
                BoundedLine::Low => write!(writer, "{:?}", bounds.min)?,
                BoundedLine::High => write!(writer, "{:?}", bounds.max)?,
            }
            writer.write_all(b"\n")?;
        }
        Ok(())
    })
    .map_err(|source| HelperError::write(output, source))?;

    log::info!(
        "Bounded {} predictions from {} into {} ({} below {}, {} above {})",
        summary.lines,
        input.display(),
        output.display(),
        summary.clipped_low,
        bounds.min,
        summary.clipped_high,
        bounds.max
    );
    Ok(summary)
}
