use colmeta_controller::{Controller, SubscriberReader};
use colmeta_core::Namespace;
use serde_json::json;

use super::{HashTarget, print_json};

pub fn run(
    controller: &Controller,
    target: HashTarget,
    namespace: &Namespace,
    subscriber: Option<&str>,
) -> anyhow::Result<()> {
    let hash = match target {
        HashTarget::Schema => controller.schemas.get_hash(namespace)?,
        HashTarget::Jobs => controller.jobs.get_hash(namespace)?,
        HashTarget::Subscribers => controller.subscribers.get_hash(namespace)?,
        HashTarget::Assignment => {
            let Some(subscriber) = subscriber else {
                anyhow::bail!("--subscriber is required for assignment hashes");
            };
            controller.assignments.get_hash(namespace, subscriber)?
        }
        HashTarget::Instances => controller.membership.get_hash(namespace)?,
        HashTarget::Placement => controller.placement.get_hash(namespace)?,
    };
    print_json(&json!({
        "namespace": namespace,
        "target": format!("{target:?}").to_lowercase(),
        "hash": hash,
    }))
}
