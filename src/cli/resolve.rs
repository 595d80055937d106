use action_locator::{LocatorResolver, Resolution};
use action_primitives::{FixtureSite, PageSnapshot};
use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Page snapshot JSON, or a fixture site (its first page is used)
    #[arg(long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Free-text target description, e.g. "Login button"
    #[arg(long)]
    pub target: String,

    /// Confidence floor; defaults to `healing.confidence_floor`
    #[arg(long)]
    pub floor: Option<f64>,

    /// Print candidates as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RankedCandidate {
    rank: usize,
    locator: String,
    confidence: f64,
    confirmed: bool,
}

/// Read a snapshot file; fixture sites fall back to their start page
pub fn load_snapshot(path: &Path) -> Result<PageSnapshot> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    if let Ok(mut snapshot) = serde_json::from_str::<PageSnapshot>(&raw) {
        snapshot.reindex();
        return Ok(snapshot);
    }
    let site: FixtureSite = serde_json::from_str(&raw)
        .with_context(|| format!("{} is neither a snapshot nor a fixture", path.display()))?;
    let start = site.start_url.clone();
    let mut pages = site.pages.into_iter();
    let page = match start {
        Some(url) => pages.find(|page| page.url == url),
        None => pages.next(),
    };
    let Some(mut snapshot) = page else {
        bail!("fixture {} has no start page", path.display());
    };
    snapshot.reindex();
    Ok(snapshot)
}

pub fn cmd_resolve(args: ResolveArgs, config: &AppConfig) -> Result<()> {
    let snapshot = load_snapshot(&args.snapshot)?;
    let floor = args.floor.unwrap_or(config.healing.confidence_floor);
    if !(0.0..=1.0).contains(&floor) {
        bail!("floor must be within [0, 1], got {floor}");
    }
    let resolution = LocatorResolver::new(floor)
        .resolve(&args.target, &snapshot)
        .context("Failed to resolve target")?;

    let ranked = rank(&resolution);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }
    if ranked.is_empty() {
        println!("No candidates for \"{}\" on {}", args.target, snapshot.url);
        return Ok(());
    }
    println!(
        "Candidates for \"{}\" on {} (floor {:.2}):",
        args.target, snapshot.url, floor
    );
    for candidate in &ranked {
        let mark = if candidate.confirmed { "" } else { "  (unconfirmed)" };
        println!(
            "  {:>2}. {:.2}  {}{mark}",
            candidate.rank, candidate.confidence, candidate.locator
        );
    }
    Ok(())
}

fn rank(resolution: &Resolution) -> Vec<RankedCandidate> {
    resolution
        .candidates
        .iter()
        .enumerate()
        .map(|(index, scored)| RankedCandidate {
            rank: index + 1,
            locator: scored.candidate.locator().to_string(),
            confidence: scored.candidate.confidence,
            confirmed: scored.confirmed,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::AxNode;

    #[test]
    fn fixture_site_uses_start_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.json");
        let site = FixtureSite {
            start_url: Some("https://app.test/b".to_string()),
            pages: vec![
                PageSnapshot::new("https://app.test/a", "A", vec![]),
                PageSnapshot::new(
                    "https://app.test/b",
                    "B",
                    vec![AxNode::new("button", "Go")],
                ),
            ],
        };
        fs::write(&path, serde_json::to_string(&site).unwrap()).unwrap();

        let snapshot = load_snapshot(&path).unwrap();
        assert_eq!(snapshot.url, "https://app.test/b");
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn ranks_follow_resolution_order() {
        let snapshot = PageSnapshot::new(
            "https://app.test/login",
            "Login",
            vec![AxNode::new("button", "Sign In").with_text("Sign In")],
        );
        let resolution = LocatorResolver::new(0.7)
            .resolve("Sign In button", &snapshot)
            .unwrap();
        let ranked = rank(&resolution);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].rank, 1);
        assert!(ranked
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence));
    }
}
