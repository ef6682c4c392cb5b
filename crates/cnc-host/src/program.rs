//! Job-file reader.
//!
//! A job file is one command per line, `;` starting a comment:
//!
//! ```text
//! ; machine a 20 mm square pocket
//! feed X20 F600
//! feed Y20
//! rapid X0 Y0
//! dwell P0.5
//! end
//! ```
//!
//! `feed` moves use the planner's accelerated line, `rapid` the simple
//! line at the configured traverse rate. Axis words are modal: unnamed
//! axes keep their last target, and `F` persists across `feed` lines.
//! This is a thin exercise driver, not a G-code interpreter.

use anyhow::{bail, Context, Result};
use motion::{math::vector_length, AxisVector, AXES};

/// One resolved program step, targets in absolute millimeters.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStep {
    Rapid { target: AxisVector, minutes: f64 },
    Feed { target: AxisVector, minutes: f64 },
    Dwell { seconds: f64 },
    SetPosition { position: AxisVector },
    Stop,
    Start,
    End,
}

/// Parse a job file, resolving modal axis words against a virtual position
/// starting at the origin.
pub fn parse_program(text: &str, traverse_rate: f64) -> Result<Vec<JobStep>> {
    let mut steps = Vec::new();
    let mut position: AxisVector = [0.0; AXES];
    let mut feed_rate = traverse_rate;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let word = parts.next().unwrap_or("").to_lowercase();
        let params = parse_params(parts, line_no)?;

        match word.as_str() {
            "rapid" | "feed" => {
                let target = apply_axes(position, &params);
                if word == "feed" {
                    if let Some(f) = param(&params, 'F') {
                        feed_rate = f;
                    }
                }
                let rate = if word == "feed" { feed_rate } else { traverse_rate };
                if rate <= 0.0 {
                    bail!("line {}: no feed rate in effect", line_no + 1);
                }
                let minutes = vector_length(&target, &position) / rate;
                if word == "feed" {
                    steps.push(JobStep::Feed { target, minutes });
                } else {
                    steps.push(JobStep::Rapid { target, minutes });
                }
                position = target;
            }
            "dwell" => {
                let seconds = param(&params, 'P')
                    .with_context(|| format!("line {}: dwell needs P<seconds>", line_no + 1))?;
                steps.push(JobStep::Dwell { seconds });
            }
            "set" => {
                position = apply_axes(position, &params);
                steps.push(JobStep::SetPosition { position });
            }
            "stop" => steps.push(JobStep::Stop),
            "start" => steps.push(JobStep::Start),
            "end" => steps.push(JobStep::End),
            other => bail!("line {}: unknown command: {other}", line_no + 1),
        }
    }
    Ok(steps)
}

fn parse_params<'a>(
    parts: impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<Vec<(char, f64)>> {
    let mut params = Vec::new();
    for part in parts {
        let mut chars = part.chars();
        let key = chars
            .next()
            .with_context(|| format!("line {}: empty parameter", line_no + 1))?
            .to_ascii_uppercase();
        let value: f64 = chars
            .as_str()
            .parse()
            .with_context(|| format!("line {}: bad parameter: {part}", line_no + 1))?;
        params.push((key, value));
    }
    Ok(params)
}

fn param(params: &[(char, f64)], key: char) -> Option<f64> {
    params.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn apply_axes(mut position: AxisVector, params: &[(char, f64)]) -> AxisVector {
    for (key, value) in params {
        match key {
            'X' => position[motion::X] = *value,
            'Y' => position[motion::Y] = *value,
            'Z' => position[motion::Z] = *value,
            'A' => position[motion::A] = *value,
            'B' => position[motion::B] = *value,
            'C' => position[motion::C] = *value,
            _ => {}
        }
    }
    position
}
