//! CPU and memory quantities in the cluster's string notation.
//!
//! CPU is held in millicores (`"500m"`, `"2"`), memory in bytes
//! (`"512Mi"`, `"4Gi"`). Both serialize back to the shortest exact form.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KI: u64 = 1024;
const MI: u64 = KI * 1024;
const GI: u64 = MI * 1024;
const TI: u64 = GI * 1024;

/// CPU amount in millicores (1000 = 1 core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpu(pub u64);

impl Cpu {
    pub fn millis(m: u64) -> Self {
        Cpu(m)
    }

    pub fn cores(c: u64) -> Self {
        Cpu(c * 1000)
    }
}

impl FromStr for Cpu {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty cpu quantity");
        }
        if let Some(m) = s.strip_suffix('m') {
            let millis = m
                .parse::<u64>()
                .map_err(|_| anyhow!("invalid cpu quantity '{}'", s))?;
            return Ok(Cpu(millis));
        }
        let cores = s
            .parse::<f64>()
            .map_err(|_| anyhow!("invalid cpu quantity '{}'", s))?;
        if !cores.is_finite() || cores < 0.0 {
            bail!("invalid cpu quantity '{}'", s);
        }
        Ok(Cpu((cores * 1000.0).round() as u64))
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}", self.0 / 1000)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

impl TryFrom<String> for Cpu {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Cpu> for String {
    fn from(c: Cpu) -> String {
        c.to_string()
    }
}

/// Memory amount in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Memory(pub u64);

impl Memory {
    pub fn mebibytes(n: u64) -> Self {
        Memory(n * MI)
    }

    pub fn gibibytes(n: u64) -> Self {
        Memory(n * GI)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for Memory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (num, unit) = s.split_at(split);
        if num.is_empty() {
            bail!("invalid memory quantity '{}'", s);
        }
        let n = num
            .parse::<u64>()
            .map_err(|_| anyhow!("invalid memory quantity '{}'", s))?;
        let multiplier = match unit {
            "" => 1,
            "Ki" => KI,
            "Mi" => MI,
            "Gi" => GI,
            "Ti" => TI,
            "k" | "K" => 1_000,
            "M" => 1_000_000,
            "G" => 1_000_000_000,
            "T" => 1_000_000_000_000,
            _ => bail!("unknown memory unit '{}' in '{}'", unit, s),
        };
        n.checked_mul(multiplier)
            .map(Memory)
            .ok_or_else(|| anyhow!("memory quantity '{}' overflows", s))
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b == 0 {
            return write!(f, "0");
        }
        for (unit, size) in [("Ti", TI), ("Gi", GI), ("Mi", MI), ("Ki", KI)] {
            if b % size == 0 {
                return write!(f, "{}{}", b / size, unit);
            }
        }
        write!(f, "{}", b)
    }
}

impl TryFrom<String> for Memory {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Memory> for String {
    fn from(m: Memory) -> String {
        m.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_notation() {
        assert_eq!("500m".parse::<Cpu>().unwrap(), Cpu(500));
        assert_eq!("2".parse::<Cpu>().unwrap(), Cpu(2000));
        assert_eq!("0.25".parse::<Cpu>().unwrap(), Cpu(250));
        assert_eq!(Cpu(1500).to_string(), "1500m");
        assert_eq!(Cpu::cores(4).to_string(), "4");
        assert!("".parse::<Cpu>().is_err());
        assert!("fast".parse::<Cpu>().is_err());
        assert!("-1".parse::<Cpu>().is_err());
    }

    #[test]
    fn memory_notation() {
        assert_eq!("512Mi".parse::<Memory>().unwrap(), Memory::mebibytes(512));
        assert_eq!("4Gi".parse::<Memory>().unwrap(), Memory::gibibytes(4));
        assert_eq!("1G".parse::<Memory>().unwrap(), Memory(1_000_000_000));
        assert_eq!("1024".parse::<Memory>().unwrap(), Memory(1024));
        assert_eq!(Memory::mebibytes(1536).to_string(), "1536Mi");
        assert_eq!(Memory::gibibytes(16).to_string(), "16Gi");
        assert_eq!(Memory(1000).to_string(), "1000");
        assert!("Gi".parse::<Memory>().is_err());
        assert!("4Xi".parse::<Memory>().is_err());
    }

    #[test]
    fn serializes_as_strings() {
        let json = serde_json::to_string(&Memory::gibibytes(2)).unwrap();
        assert_eq!(json, "\"2Gi\"");
        let cpu: Cpu = serde_json::from_str("\"750m\"").unwrap();
        assert_eq!(cpu, Cpu(750));
        assert!(serde_json::from_str::<Cpu>("\"lots\"").is_err());
    }
}
