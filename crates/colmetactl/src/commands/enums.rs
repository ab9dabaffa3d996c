use colmeta_controller::{Controller, EnumMutator, EnumReader};
use serde_json::json;

use super::{EnumAction, print_json};

pub fn run(controller: &Controller, action: EnumAction) -> anyhow::Result<()> {
    match action {
        EnumAction::Get {
            namespace,
            table,
            column,
        } => print_json(&controller.enums.get_enum_cases(&namespace, &table, &column)?),
        EnumAction::Extend {
            namespace,
            table,
            column,
            cases,
        } => {
            let codes = controller
                .enums
                .extend_enum_cases(&namespace, &table, &column, &cases)?;
            let mapping: Vec<_> = cases
                .iter()
                .zip(&codes)
                .map(|(case, code)| json!({ "case": case, "code": code }))
                .collect();
            print_json(&mapping)
        }
    }
}
