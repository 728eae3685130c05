//! Traffic-shift policies

use std::str::FromStr;
use std::time::Duration;

/// How traffic moves from the live revision to a validated candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftPolicy {
    /// Route everything to the candidate at once
    AllAtOnce,
    /// Add `step_percent` every `interval` until the candidate takes everything
    Linear { step_percent: u8, interval: Duration },
    /// Route `percent` to the candidate, hold for `wait`, then shift the rest
    Canary { percent: u8, wait: Duration },
}

/// One traffic weight applied to the candidate, held for `hold` before the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftStep {
    pub weight: u8,
    pub hold: Duration,
}

impl ShiftPolicy {
    /// Weights the candidate goes through; the last step is always 100
    pub fn schedule(&self) -> Vec<ShiftStep> {
        match self {
            ShiftPolicy::AllAtOnce => vec![ShiftStep {
                weight: 100,
                hold: Duration::ZERO,
            }],
            ShiftPolicy::Linear {
                step_percent,
                interval,
            } => {
                let step = (*step_percent).clamp(1, 100);
                let mut steps = Vec::new();
                let mut weight = step;
                while weight < 100 {
                    steps.push(ShiftStep {
                        weight,
                        hold: *interval,
                    });
                    weight = weight.saturating_add(step);
                }
                steps.push(ShiftStep {
                    weight: 100,
                    hold: Duration::ZERO,
                });
                steps
            }
            ShiftPolicy::Canary { percent, wait } => vec![
                ShiftStep {
                    weight: *percent,
                    hold: *wait,
                },
                ShiftStep {
                    weight: 100,
                    hold: Duration::ZERO,
                },
            ],
        }
    }
}

impl FromStr for ShiftPolicy {
    type Err = String;

    /// Parses `all-at-once`, `linear:<percent>:<seconds>` or `canary:<percent>:<seconds>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();

        let parse_args = |percent: &str, seconds: &str| -> Result<(u8, Duration), String> {
            let percent: u8 = percent
                .parse()
                .map_err(|_| format!("invalid percent '{}'", percent))?;
            let seconds: u64 = seconds
                .parse()
                .map_err(|_| format!("invalid seconds '{}'", seconds))?;
            Ok((percent, Duration::from_secs(seconds)))
        };

        match parts.as_slice() {
            ["all-at-once"] => Ok(ShiftPolicy::AllAtOnce),
            ["linear", percent, seconds] => {
                let (step_percent, interval) = parse_args(percent, seconds)?;
                if step_percent == 0 || step_percent > 100 {
                    return Err("linear step must be between 1 and 100 percent".to_string());
                }
                Ok(ShiftPolicy::Linear {
                    step_percent,
                    interval,
                })
            }
            ["canary", percent, seconds] => {
                let (percent, wait) = parse_args(percent, seconds)?;
                if percent == 0 || percent >= 100 {
                    return Err("canary percent must be between 1 and 99".to_string());
                }
                Ok(ShiftPolicy::Canary { percent, wait })
            }
            _ => Err(format!(
                "unknown traffic shift '{}', expected all-at-once, linear:<percent>:<seconds> or canary:<percent>:<seconds>",
                s
            )),
        }
    }
}

impl std::fmt::Display for ShiftPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftPolicy::AllAtOnce => write!(f, "all-at-once"),
            ShiftPolicy::Linear {
                step_percent,
                interval,
            } => write!(f, "linear:{}:{}", step_percent, interval.as_secs()),
            ShiftPolicy::Canary { percent, wait } => {
                write!(f, "canary:{}:{}", percent, wait.as_secs())
            }
        }
    }
}
