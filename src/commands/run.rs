//! Run command handler.

use std::path::Path;
use std::sync::Arc;

use mirrorkeep::config::MirrorkeepConfig;
use mirrorkeep::remote::MountedShareConnector;
use mirrorkeep::{MirrorEngine, MirrorPolicy};

use super::load_selected_policies;

/// Run command.
///
/// Runs every policy in file order, or only the ones named with `--policy`.
/// With `dry_run`, admission and pruning are evaluated but nothing is copied
/// or deleted.
///
/// Fails when the configuration cannot be loaded or when any policy reports
/// a failure, so that cron surfaces the run.
///
/// # Examples
///
/// ```bash
/// # Run all policies from the configured file
/// mirrorkeep run
///
/// # Preview one policy
/// mirrorkeep run --policy accounting_actualize --dry-run
/// ```
pub fn cmd_run(
    config: &MirrorkeepConfig,
    policies: Option<&Path>,
    only: &[String],
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (path, loaded) = load_selected_policies(config, policies)?;
    let selected = select_policies(loaded, only)?;

    if selected.is_empty() {
        println!("No policies in {}", path.display());
        return Ok(());
    }
    if config.mounts.is_empty() {
        tracing::warn!("No share mounts configured, every host will be unreachable");
    }

    let connector = Arc::new(MountedShareConnector::new(config.mounts.clone()));
    let engine = MirrorEngine::new(connector, config.engine_settings(dry_run));
    let report = engine.run(&selected);

    println!("{}", report.summary());

    if report.is_success() {
        Ok(())
    } else {
        let failed = report.policies.iter().filter(|p| p.has_failures()).count();
        Err(format!("{failed} of {} policies reported failures", report.policies.len()).into())
    }
}

/// Keeps the policies named in `only`, in file order. A name shared by
/// several policies selects all of them. An empty `only` keeps everything.
fn select_policies(
    policies: Vec<MirrorPolicy>,
    only: &[String],
) -> Result<Vec<MirrorPolicy>, Box<dyn std::error::Error>> {
    if only.is_empty() {
        return Ok(policies);
    }

    if let Some(unknown) = only
        .iter()
        .find(|name| !policies.iter().any(|p| p.name() == name.as_str()))
    {
        return Err(format!("unknown policy '{unknown}'").into());
    }

    Ok(policies
        .into_iter()
        .filter(|p| only.iter().any(|name| name == p.name()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorkeep::{RemoteDirectory, RemoteHost, RetentionRule, TargetSpec};

    fn policy(name: &str) -> MirrorPolicy {
        let host = RemoteHost::new("h", "m", "u", "p", "l");
        MirrorPolicy::new(
            name,
            host.clone(),
            RemoteDirectory::new("s", "/in/"),
            RetentionRule::new(1, false),
            vec![TargetSpec::new(host, RemoteDirectory::new("s", "/out/"))],
        )
        .expect("policy")
    }

    #[test]
    fn test_select_keeps_file_order() {
        let all = vec![policy("a"), policy("b"), policy("c")];
        let selected =
            select_policies(all, &["c".to_string(), "a".to_string()]).expect("selection");
        let names: Vec<&str> = selected.iter().map(MirrorPolicy::name).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_select_takes_every_policy_sharing_a_name() {
        let all = vec![policy("a"), policy("b"), policy("a")];
        let selected = select_policies(all, &["a".to_string()]).expect("selection");
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|p| p.name() == "a"));
    }

    #[test]
    fn test_select_rejects_unknown_name() {
        assert!(select_policies(vec![policy("a")], &["zzz".to_string()]).is_err());
    }

    #[test]
    fn test_select_everything_by_default() {
        assert_eq!(select_policies(vec![policy("a"), policy("b")], &[]).expect("all").len(), 2);
    }
}
