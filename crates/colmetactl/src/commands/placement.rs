use colmeta_controller::{Controller, PlacementMutator};
use colmeta_core::{Instance, Namespace};

use super::{PlacementAction, print_json};

pub fn run(controller: &Controller, action: PlacementAction) -> anyhow::Result<()> {
    let placements = &controller.placement;
    let placement = match action {
        PlacementAction::Build {
            namespace,
            shards,
            replicas,
            instance,
        } => {
            let members = members(controller, &namespace, &instance)?;
            placements.build_initial_placement(&namespace, shards, replicas, &members)?
        }
        PlacementAction::Show { namespace } => placements.get_current_placement(&namespace)?,
        PlacementAction::Add {
            namespace,
            instance,
        } => {
            let new = members(controller, &namespace, &instance)?;
            placements.add_instance(&namespace, &new)?
        }
        PlacementAction::Replace {
            namespace,
            leaving,
            instance,
        } => {
            let new = members(controller, &namespace, &instance)?;
            placements.replace_instance(&namespace, &leaving, &new)?
        }
        PlacementAction::Remove { namespace, leaving } => {
            placements.remove_instance(&namespace, &leaving)?
        }
        PlacementAction::MarkAvailable {
            namespace,
            instance,
            shards,
        } => match instance {
            None => placements.mark_namespace_available(&namespace)?,
            Some(id) if shards.is_empty() => placements.mark_instance_available(&namespace, &id)?,
            Some(id) => placements.mark_shards_available(&namespace, &id, &shards)?,
        },
    };
    print_json(&placement)
}

/// Membership records for `ids`, or every member when `ids` is empty.
fn members(
    controller: &Controller,
    namespace: &Namespace,
    ids: &[String],
) -> anyhow::Result<Vec<Instance>> {
    let members = if ids.is_empty() {
        controller.membership.get_instances(namespace)?
    } else {
        controller.membership.resolve(namespace, ids)?
    };
    Ok(members)
}
