//! Check command handler.

use std::collections::BTreeSet;
use std::path::Path;

use mirrorkeep::config::MirrorkeepConfig;
use mirrorkeep::remote::MountPoint;
use mirrorkeep::{MirrorPolicy, TargetSpec};

use super::load_selected_policies;

/// Check command.
///
/// Loads and validates the policy file, prints one block per policy and
/// lists every `(host, share)` pair the policies use that has no mount.
/// Never connects to a share.
pub fn cmd_check(
    config: &MirrorkeepConfig,
    policies: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (path, loaded) = load_selected_policies(config, policies)?;

    println!("Policy file: {}", path.display());
    println!("Policies: {}", loaded.len());
    println!();

    for policy in &loaded {
        print_policy(policy);
    }

    let missing = unmounted_shares(&loaded, &config.mounts);
    if missing.is_empty() {
        println!("All shares are mounted.");
        return Ok(());
    }

    println!("Shares without a mount:");
    for (host, share) in &missing {
        println!("  {host} {share}");
    }
    Err(format!("{} share(s) have no mount configured", missing.len()).into())
}

fn print_policy(policy: &MirrorPolicy) {
    let rule = policy.rule();
    println!("{} ({})", policy.name(), policy.method());
    println!(
        "  source: {} {}",
        policy.source_host(),
        policy.source_directory()
    );
    println!(
        "  rule: max age {} days, {}",
        rule.max_age_days,
        if rule.delete_source { "delete source" } else { "keep source" }
    );
    for target in policy.targets() {
        println!("  target: {}", describe_target(target));
    }
    println!();
}

fn describe_target(target: &TargetSpec) -> String {
    let limit = target
        .max_retained_count
        .map_or_else(|| "unlimited".to_string(), |count| format!("keep {count}"));
    format!("{} {} ({limit})", target.host, target.directory)
}

/// `(host, share)` pairs used by `policies` with no entry in `mounts`.
fn unmounted_shares(policies: &[MirrorPolicy], mounts: &[MountPoint]) -> BTreeSet<(String, String)> {
    policies
        .iter()
        .flat_map(|policy| {
            std::iter::once((policy.source_host(), policy.source_directory())).chain(
                policy
                    .targets()
                    .iter()
                    .map(|target| (&target.host, &target.directory)),
            )
        })
        .map(|(host, dir)| (host.address().to_string(), dir.share().to_string()))
        .filter(|(host, share)| {
            !mounts
                .iter()
                .any(|mount| &mount.host == host && &mount.share == share)
        })
        .collect()
}
