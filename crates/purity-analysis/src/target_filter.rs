// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use purity_model::{SemanticModel, SymbolData};
use serde::{Deserialize, Serialize};

#[derive(clap::Args, Debug, Clone, Deserialize, Serialize, Default)]
#[clap(next_help_heading = "Filtering Options")]
pub struct TargetFilterOptions {
    /// Specify declaring types to target (simple or fully qualified names)
    #[clap(long = "types", global = true, value_delimiter = ',')]
    pub types: Option<Vec<String>>,

    /// Specify member names to target
    #[clap(long = "members", global = true, value_delimiter = ',')]
    pub members: Option<Vec<String>>,
}

fn type_matches(symbol: &SymbolData, name: &str) -> bool {
    let type_name = symbol.declaring_type();
    type_name == name || type_name.rsplit('.').next() == Some(name)
}

impl TargetFilterOptions {
    pub fn is_targeted(&self, symbol: &SymbolData) -> bool {
        if let Some(types) = &self.types {
            if !types.iter().any(|t| type_matches(symbol, t)) {
                return false;
            }
        }

        if let Some(members) = &self.members {
            members.iter().any(|m| m == symbol.member_name())
        } else {
            true
        }
    }

    pub fn check_filter_correctness(&self, model: &SemanticModel) -> Option<String> {
        if let Some(types) = &self.types {
            for type_name in types {
                if !model.get_symbols().any(|(_, s)| type_matches(s, type_name)) {
                    return Some(format!("Type `{}` does not exist", type_name));
                }
            }
        }

        if let Some(members) = &self.members {
            let candidates = model
                .get_symbols()
                .map(|(_, s)| s)
                .filter(|s| {
                    self.types
                        .as_ref()
                        .map_or(true, |types| types.iter().any(|t| type_matches(s, t)))
                })
                .collect::<Vec<_>>();

            for member in members {
                if !candidates.iter().any(|s| s.member_name() == member) {
                    return Some(format!("Member `{}` does not exist", member));
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{model_from_json, pure_method};
    use serde_json::json;

    fn model() -> SemanticModel {
        model_from_json(json!([
            pure_method("Demo.Counter.Get()", "1:1-1:2", json!([])),
            pure_method("Demo.Counter.Reset()", "2:1-2:2", json!([])),
            pure_method("Demo.Shapes.Circle.Area()", "3:1-3:2", json!([])),
        ]))
    }

    #[test]
    fn filters_by_type_and_member() {
        let model = model();
        let filter = TargetFilterOptions {
            types: Some(vec!["Counter".to_string()]),
            members: Some(vec!["Get".to_string()]),
        };
        let targeted = model
            .get_symbols()
            .filter(|(_, s)| filter.is_targeted(s))
            .map(|(_, s)| s.signature.as_str())
            .collect::<Vec<_>>();
        assert_eq!(targeted, vec!["Demo.Counter.Get()"]);
        assert_eq!(filter.check_filter_correctness(&model), None);
    }

    #[test]
    fn reports_unknown_names() {
        let model = model();
        let filter = TargetFilterOptions {
            types: Some(vec!["Demo.Shapes.Square".to_string()]),
            members: None,
        };
        assert_eq!(
            filter.check_filter_correctness(&model),
            Some("Type `Demo.Shapes.Square` does not exist".to_string())
        );

        let filter = TargetFilterOptions {
            types: Some(vec!["Circle".to_string()]),
            members: Some(vec!["Get".to_string()]),
        };
        assert_eq!(
            filter.check_filter_correctness(&model),
            Some("Member `Get` does not exist".to_string())
        );
    }
}
