//! Stack configuration.
//!
//! Configuration is threaded explicitly through assembly rather than read
//! from the ambient environment, so construction is a pure function of its
//! inputs. The binary entry point is responsible for parsing whatever process
//! configuration it wants into a [`StackConfig`].

use std::path::PathBuf;

/// The named environment a stack is assembled for.
///
/// Used only to select log retention and to gate whether the destructive
/// teardown aspect may be registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Dev,
    Test,
    Prod,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Test => "test",
            Stage::Prod => "prod",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Stage::Dev),
            "test" => Ok(Stage::Test),
            "prod" => Ok(Stage::Prod),
            other => Err(format!("unknown stage '{other}' (expected dev, test or prod)")),
        }
    }
}

/// Inputs to one assembly pass.
#[derive(Clone, Debug)]
pub struct StackConfig {
    /// The stack name, used as the root logical id and as the prefix of every
    /// derived resource name.
    pub name: String,
    pub stage: Stage,
    /// Remove all resources when the stack is deleted. Only to be used on dev
    /// and test environments.
    ///
    /// Defaults to `false`.
    pub ephemeral: bool,
    /// Directory where packaged function artifacts are found by convention,
    /// keyed by function name.
    pub asset_dir: PathBuf,
}

impl StackConfig {
    pub fn new(name: impl Into<String>) -> Self {
        StackConfig {
            name: name.into(),
            stage: Stage::default(),
            ephemeral: false,
            asset_dir: PathBuf::from("target/lambda"),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    pub fn with_asset_dir(mut self, asset_dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = asset_dir.into();
        self
    }
}
