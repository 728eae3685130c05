//! Environment resolution against a run's exported namespaces

use relay_core::domain::pipeline::{ActionDefinition, EnvValue};
use relay_core::domain::variables::VariableNamespace;
use std::collections::BTreeMap;

/// Resolves every declared variable of `action`
///
/// Only namespaces already recorded in the run are visible, which is what
/// keeps same-run-order outputs out of reach.
pub fn resolve_env(
    action: &ActionDefinition,
    namespaces: &BTreeMap<String, VariableNamespace>,
) -> Result<BTreeMap<String, String>, String> {
    let mut env = BTreeMap::new();

    for (name, value) in &action.env {
        let resolved = match value {
            EnvValue::Literal(literal) => literal.clone(),
            EnvValue::Variable { namespace, key } => {
                let exported = namespaces.get(namespace).ok_or_else(|| {
                    format!(
                        "{} references namespace '{}' which has not been exported",
                        name, namespace
                    )
                })?;
                exported
                    .get(key)
                    .ok_or_else(|| {
                        format!(
                            "{} references {}.{} which was not exported by {}",
                            name, namespace, key, exported.produced_by
                        )
                    })?
                    .to_string()
            }
        };
        env.insert(name.clone(), resolved);
    }

    Ok(env)
}
