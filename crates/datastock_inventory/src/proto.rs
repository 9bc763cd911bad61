//! Proto dataset selection policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which member of a sorted collection serves as the aggregation template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtoChoice {
    First,
    Latest,
    #[default]
    Penultimate,
    Random,
}

impl ProtoChoice {
    /// Index of the proto dataset among `n` sorted files.
    ///
    /// Collections with fewer than two files always use index 0.
    pub fn index(&self, n: usize) -> usize {
        if n < 2 {
            return 0;
        }
        match self {
            ProtoChoice::First => 0,
            ProtoChoice::Latest => n - 1,
            ProtoChoice::Penultimate => n - 2,
            ProtoChoice::Random => rand::random::<usize>() % n,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoChoice::First => "first",
            ProtoChoice::Latest => "latest",
            ProtoChoice::Penultimate => "penultimate",
            ProtoChoice::Random => "random",
        }
    }
}

impl FromStr for ProtoChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(ProtoChoice::First),
            "latest" | "last" => Ok(ProtoChoice::Latest),
            "penultimate" => Ok(ProtoChoice::Penultimate),
            "random" => Ok(ProtoChoice::Random),
            other => Err(format!(
                "Unknown proto choice '{}'. Use first, latest, penultimate or random",
                other
            )),
        }
    }
}

impl fmt::Display for ProtoChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
