//! Fetch workflow orchestration for GHS.
//!
//! One pass: initialize/open the store, load known identities, discover
//! contributors across the configured targets, fetch the profiles not yet
//! persisted, insert them one by one, and export the table as a best-effort
//! terminal step. Per-unit failures are logged and skipped; only a corrupt
//! target list aborts the run.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use ghs_forge::{Forge, ForgeClient, ForgeConfig};
use ghs_store::ProfileStore;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "ghs-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub csv_path: PathBuf,
    pub repos_file: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub token: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("GHS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("hiring.db")),
            csv_path: std::env::var("GHS_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("hiring.csv")),
            repos_file: std::env::var("GHS_REPOS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("repos.txt")),
            user_agent: std::env::var("GHS_USER_AGENT")
                .unwrap_or_else(|_| "ghs-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("GHS_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }
}

/// The run cannot proceed without a valid target list.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed target on line {line_no}: {line:?} (expected org/repo)")]
    MalformedTarget { line_no: usize, line: String },
}

/// An (organization, repository) pair whose contributors are discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub org: String,
    pub repo: String,
}

/// Parse the target list: one `org/repo` per line, blank lines and `#`
/// comments skipped. A line without the separator is fatal.
pub fn parse_targets(text: &str) -> Result<Vec<Target>, ConfigError> {
    let mut targets = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((org, repo)) = line.split_once('/') else {
            return Err(ConfigError::MalformedTarget {
                line_no: index + 1,
                line: line.to_string(),
            });
        };
        targets.push(Target {
            org: org.to_string(),
            repo: repo.to_string(),
        });
    }
    Ok(targets)
}

/// Discovered logins not yet persisted.
pub fn new_logins(discovered: &HashSet<String>, existing: &HashSet<String>) -> HashSet<String> {
    discovered.difference(existing).cloned().collect()
}

/// Outcome counts reported at the end of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: usize,
    pub discovered: usize,
    pub new_logins: usize,
    pub saved: usize,
    /// `None` when nothing new was fetched or the export failed.
    pub exported_rows: Option<usize>,
}

pub fn forge_from_config(config: &SyncConfig) -> Result<ForgeClient> {
    ForgeClient::new(ForgeConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: config.user_agent.clone(),
        token: config.token.clone(),
        ..ForgeConfig::default()
    })
    .context("building forge client")
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    let config = SyncConfig::from_env();
    let forge = forge_from_config(&config)?;
    run_once(&config, &forge).await
}

pub async fn run_once(config: &SyncConfig, forge: &dyn Forge) -> Result<RunSummary> {
    let started_at = Utc::now();

    ProfileStore::initialize_if_missing(&config.db_path)
        .await
        .with_context(|| format!("initializing store at {}", config.db_path.display()))?;
    let store = ProfileStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;

    let existing = store
        .all_identities()
        .await
        .context("loading existing identities")?;
    info!(existing = existing.len(), "loaded persisted identities");

    let text = tokio::fs::read_to_string(&config.repos_file)
        .await
        .with_context(|| format!("reading target list {}", config.repos_file.display()))?;
    let targets = parse_targets(&text)?;

    // Fan-out over targets; a failed target logs and contributes nothing.
    let contributor_batches = join_all(targets.iter().map(|target| async move {
        match forge.contributors(&target.org, &target.repo).await {
            Ok(identities) => identities,
            Err(error) => {
                warn!(org = %target.org, repo = %target.repo, %error, "contributor fetch failed");
                Vec::new()
            }
        }
    }))
    .await;

    let discovered: HashSet<String> = contributor_batches
        .into_iter()
        .flatten()
        .map(|identity| identity.login)
        .collect();
    let fresh = new_logins(&discovered, &existing);
    info!(
        discovered = discovered.len(),
        new = fresh.len(),
        "contributor discovery complete"
    );

    if fresh.is_empty() {
        info!("no new profiles to fetch");
        return Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            targets: targets.len(),
            discovered: discovered.len(),
            new_logins: 0,
            saved: 0,
            exported_rows: None,
        });
    }

    // Fan-out over new logins; a failed unit logs and yields nothing.
    let fresh: Vec<String> = fresh.into_iter().collect();
    let profiles = join_all(fresh.iter().map(|login| async move {
        match forge.fetch_profile(login).await {
            Ok(profile) => Some(profile),
            Err(error) => {
                warn!(%login, %error, "profile fetch failed");
                None
            }
        }
    }))
    .await;

    // Single-writer insert loop, one transaction per profile.
    let mut saved = 0usize;
    for profile in profiles.into_iter().flatten() {
        match store.insert(&profile).await {
            Ok(()) => {
                saved += 1;
                info!(login = %profile.login, "saved profile");
            }
            Err(error) => warn!(login = %profile.login, %error, "saving profile failed"),
        }
    }
    info!(saved, attempted = fresh.len(), "profile persistence complete");

    // Best-effort terminal export; failure never changes the run's status.
    let exported_rows = match store.export_csv(&config.csv_path).await {
        Ok(rows) => Some(rows),
        Err(error) => {
            warn!(path = %config.csv_path.display(), %error, "csv export failed");
            None
        }
    };

    Ok(RunSummary {
        started_at,
        finished_at: Utc::now(),
        targets: targets.len(),
        discovered: discovered.len(),
        new_logins: fresh.len(),
        saved,
        exported_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ghs_core::{BlogLink, ContributorIdentity, Profile, ValidationError};
    use ghs_forge::{FetchError, ForgeError};
    use std::collections::HashMap;
    use tempfile::tempdir;
    use url::Url;

    struct StubForge {
        /// Keyed by `org/repo`; a missing key behaves like a 404.
        contributors: HashMap<String, Vec<ContributorIdentity>>,
        failing_logins: HashSet<String>,
    }

    impl StubForge {
        fn new(contributors: &[(&str, &[&str])], failing_logins: &[&str]) -> Self {
            let contributors = contributors
                .iter()
                .map(|(target, logins)| {
                    let identities = logins
                        .iter()
                        .enumerate()
                        .map(|(index, login)| ContributorIdentity {
                            login: login.to_string(),
                            id: index as i64 + 1,
                            contributions: 10,
                        })
                        .collect();
                    (target.to_string(), identities)
                })
                .collect();
            Self {
                contributors,
                failing_logins: failing_logins.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    fn stub_profile(login: &str) -> Profile {
        Profile {
            login: login.to_string(),
            name: Some(login.to_uppercase()),
            bio: None,
            location: Some("Remote".to_string()),
            company: None,
            blog: BlogLink::Absent,
            twitter: None,
            email: None,
            public_repos: 1,
            followers: 2,
            following: 3,
            created_at: Utc::now(),
            languages: vec!["Rust".to_string()],
            hireable: None,
            html_url: Url::parse(&format!("https://github.com/{login}")).expect("url"),
            repos_url: Url::parse(&format!("https://api.github.com/users/{login}/repos"))
                .expect("url"),
            organizations_url: Url::parse(&format!("https://api.github.com/users/{login}/orgs"))
                .expect("url"),
        }
    }

    #[async_trait]
    impl Forge for StubForge {
        async fn contributors(
            &self,
            org: &str,
            repo: &str,
        ) -> Result<Vec<ContributorIdentity>, FetchError> {
            match self.contributors.get(&format!("{org}/{repo}")) {
                Some(identities) => Ok(identities.clone()),
                None => Err(FetchError::HttpStatus {
                    status: 404,
                    url: format!("https://api.github.com/repos/{org}/{repo}/contributors"),
                }),
            }
        }

        async fn fetch_profile(&self, login: &str) -> Result<Profile, ForgeError> {
            if self.failing_logins.contains(login) {
                return Err(ForgeError::Validation(ValidationError::MissingField(
                    "created_at",
                )));
            }
            Ok(stub_profile(login))
        }
    }

    fn config_in(dir: &std::path::Path) -> SyncConfig {
        SyncConfig {
            db_path: dir.join("hiring.db"),
            csv_path: dir.join("hiring.csv"),
            repos_file: dir.join("repos.txt"),
            user_agent: "ghs-test".to_string(),
            http_timeout_secs: 5,
            token: None,
        }
    }

    #[test]
    fn target_list_skips_blanks_and_comments() {
        let targets = parse_targets("# staff picks\n\nrust-lang/rust\n  tokio-rs/tokio  \n")
            .expect("parses");
        assert_eq!(
            targets,
            vec![
                Target { org: "rust-lang".into(), repo: "rust".into() },
                Target { org: "tokio-rs".into(), repo: "tokio".into() },
            ]
        );
    }

    #[test]
    fn malformed_target_line_is_fatal() {
        let err = parse_targets("rust-lang/rust\nnot-a-target\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedTarget { line_no: 2, .. }));
    }

    #[test]
    fn new_logins_is_set_difference() {
        let existing: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let discovered: HashSet<String> =
            ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let fresh = new_logins(&discovered, &existing);
        let expected: HashSet<String> = ["c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fresh, expected);
    }

    #[tokio::test]
    async fn one_bad_profile_does_not_abort_the_batch() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::write(&config.repos_file, "acme/widgets\n").expect("write targets");

        let forge =
            StubForge::new(&[("acme/widgets", &["alice", "bob", "carol"][..])], &["bob"]);
        let summary = run_once(&config, &forge).await.expect("run succeeds");

        assert_eq!(summary.discovered, 3);
        assert_eq!(summary.new_logins, 3);
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.exported_rows, Some(2));

        let store = ProfileStore::open(&config.db_path).await.expect("open");
        let identities = store.all_identities().await.expect("identities");
        assert!(identities.contains("alice"));
        assert!(identities.contains("carol"));
        assert!(!identities.contains("bob"));
    }

    #[tokio::test]
    async fn second_run_fetches_nothing_new() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::write(&config.repos_file, "acme/widgets\n").expect("write targets");

        let forge = StubForge::new(&[("acme/widgets", &["alice", "bob"][..])], &[]);
        let first = run_once(&config, &forge).await.expect("first run");
        assert_eq!(first.saved, 2);

        let second = run_once(&config, &forge).await.expect("second run");
        assert_eq!(second.discovered, 2);
        assert_eq!(second.new_logins, 0);
        assert_eq!(second.saved, 0);
        assert_eq!(second.exported_rows, None);
    }

    #[tokio::test]
    async fn failed_target_contributes_zero_identities() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::write(&config.repos_file, "acme/widgets\nacme/defunct\n")
            .expect("write targets");

        // acme/defunct is not in the stub, so its fetch 404s.
        let forge = StubForge::new(&[("acme/widgets", &["alice"][..])], &[]);
        let summary = run_once(&config, &forge).await.expect("run succeeds");

        assert_eq!(summary.targets, 2);
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.saved, 1);
    }

    #[tokio::test]
    async fn export_lands_after_a_run() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::write(&config.repos_file, "acme/widgets\n").expect("write targets");

        let forge = StubForge::new(&[("acme/widgets", &["alice"][..])], &[]);
        run_once(&config, &forge).await.expect("run succeeds");

        let text = std::fs::read_to_string(&config.csv_path).expect("csv exists");
        assert!(text.lines().next().expect("header").contains("\"login\""));
        assert!(text.contains("\"alice\""));
    }
}
