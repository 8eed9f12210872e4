//! Which part types may be linked as parent and child.

use crate::error::BomError;
use crate::part::PartCode;
use serde::{Deserialize, Serialize};

const ASSEMBLY_PREFIX: char = 'A';
const SUB_ASSEMBLY_PREFIX: char = 'S';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// Any part type may contain any other.
    #[default]
    Open,
    /// Only assemblies (`A`) and sub-assemblies (`S`) have children, and a
    /// top-level assembly is never a child.
    AssemblyOnly,
}

impl LinkPolicy {
    pub fn check(&self, parent: &PartCode, child: &PartCode) -> Result<(), BomError> {
        match self {
            Self::Open => Ok(()),
            Self::AssemblyOnly => {
                if !matches!(parent.type_prefix(), ASSEMBLY_PREFIX | SUB_ASSEMBLY_PREFIX) {
                    return Err(BomError::PolicyViolation(format!(
                        "{parent} cannot have children: only A or S parts are assemblies"
                    )));
                }
                if child.type_prefix() == ASSEMBLY_PREFIX {
                    return Err(BomError::PolicyViolation(format!(
                        "{child} is a top-level assembly and cannot be a child"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::AssemblyOnly => "assembly-only",
        }
    }
}

impl std::str::FromStr for LinkPolicy {
    type Err = BomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(Self::Open),
            "assembly-only" | "assembly_only" => Ok(Self::AssemblyOnly),
            other => Err(BomError::Config(format!(
                "unknown link policy `{other}` (expected open or assembly-only)"
            ))),
        }
    }
}
