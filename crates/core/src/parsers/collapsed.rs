use thiserror::Error;

use crate::model::{FrameInfo, Profile, StackListBuilder, ValueUnit};

#[derive(Debug, Error)]
pub enum CollapsedParseError {
    #[error("line {line}: weight {weight} is negative or not finite")]
    InvalidWeight { line: usize, weight: f64 },
}

/// Parse Brendan Gregg's collapsed/folded stack format.
///
/// Each line has the format: `frame;frame;... count`, where the count is
/// the last space-separated token. Used by `stackcollapse-*.pl`, dtrace
/// and the FlameGraph tools.
///
/// Returns `Ok(None)` when the text is not in this format at all: a line
/// without a numeric count, or no stack lines.
pub fn parse_collapsed(text: &str, name: &str) -> Result<Option<Profile>, CollapsedParseError> {
    let mut builder = StackListBuilder::new();
    let mut stack = Vec::new();
    let mut samples = 0usize;

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((stack_str, count)) = line.rsplit_once(' ') else {
            return Ok(None);
        };
        let Ok(weight) = count.parse::<f64>() else {
            return Ok(None);
        };
        if !weight.is_finite() || weight < 0.0 {
            return Err(CollapsedParseError::InvalidWeight {
                line: index + 1,
                weight,
            });
        }

        stack.clear();
        for frame in stack_str.trim_end().split(';').filter(|f| !f.is_empty()) {
            stack.push(builder.frame_id(&FrameInfo::named(frame)));
        }
        builder.append_sample(&stack, weight);
        samples += 1;
    }

    if samples == 0 {
        return Ok(None);
    }
    Ok(Some(builder.build(name, ValueUnit::None)))
}
