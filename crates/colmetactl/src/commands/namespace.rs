use colmeta_controller::Controller;

use super::{NamespaceAction, print_json};

pub fn run(controller: &Controller, action: NamespaceAction) -> anyhow::Result<()> {
    match action {
        NamespaceAction::Create { namespace } => {
            controller.namespaces.create_namespace(&namespace)?;
            println!("✓ Created namespace {namespace}");
            Ok(())
        }
        NamespaceAction::List => print_json(&controller.namespaces.list_namespaces()?),
    }
}
