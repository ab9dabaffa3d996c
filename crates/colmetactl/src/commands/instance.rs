use colmeta_controller::Controller;
use colmeta_core::Instance;

use super::{InstanceAction, print_json};

pub fn run(controller: &Controller, action: InstanceAction) -> anyhow::Result<()> {
    match action {
        InstanceAction::Join {
            namespace,
            id,
            endpoint,
            zone,
            weight,
        } => {
            let instance = Instance {
                id,
                endpoint,
                zone,
                weight,
            };
            controller.membership.join(&namespace, &instance)?;
            print_json(&instance)
        }
        InstanceAction::Leave { namespace, id } => {
            controller.membership.leave(&namespace, &id)?;
            println!("✓ Instance {id} left {namespace}");
            Ok(())
        }
        InstanceAction::List { namespace } => {
            print_json(&controller.membership.get_instances(&namespace)?)
        }
    }
}
