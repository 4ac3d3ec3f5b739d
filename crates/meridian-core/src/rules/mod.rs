mod loader;
mod types;

pub use loader::{load_named_ruleset, load_rules, RulesError, RulesSource};
pub use types::{
    BorderSettings, CompiledRules, FoundingSettings, GameSettings, RequireExplored, TerrainType,
    UnitType,
};
