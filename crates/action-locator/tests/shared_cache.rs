use action_locator::{LocatorCache, LocatorResolver, SharedLocatorCache};
use action_primitives::{AxNode, CandidateSource, Locator, LocatorCandidate, PageSnapshot};
use selfheal_core_types::StepFingerprint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fingerprint() -> StepFingerprint {
    StepFingerprint::derive("click", "Login button", "https://app.test/login?next=/home")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_heal_a_fingerprint_once() {
    let shared = SharedLocatorCache::new();
    let heals = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for run in 0..8 {
        let shared = shared.clone();
        let heals = heals.clone();
        tasks.push(tokio::spawn(async move {
            let mut cache = LocatorCache::new().with_shared(shared.clone());
            let lock = shared.heal_lock(&fingerprint());
            let _guard = lock.lock().await;
            if let Some(candidate) = cache.get(&fingerprint()) {
                return candidate;
            }
            heals.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let candidate = LocatorCandidate::new(
                Locator::role_name("button", &format!("Sign In {}", run)),
                0.9,
                CandidateSource::HealedTier1,
            );
            cache.write(fingerprint(), candidate.clone());
            candidate
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(heals.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn fingerprint_ignores_query_string_across_runs() {
    let shared = SharedLocatorCache::new();
    let mut first = LocatorCache::new().with_shared(shared.clone());
    let candidate = LocatorCandidate::declared(Locator::exact_text("Sign In"));
    first.write(fingerprint(), candidate.clone());

    let second = LocatorCache::new().with_shared(shared);
    let other_visit =
        StepFingerprint::derive("click", "login  button", "https://app.test/login?next=/billing");
    assert_eq!(second.get(&other_visit), Some(candidate));
}

#[test]
fn renamed_button_resolves_only_after_redesign_is_described() {
    let before = PageSnapshot::new(
        "https://app.test/login",
        "Login",
        vec![AxNode::new("button", "Login").with_text("Login").with_depth(3)],
    );
    let after = PageSnapshot::new(
        "https://app.test/login",
        "Login",
        vec![AxNode::new("button", "Sign In").with_text("Sign In").with_depth(3)],
    );

    let resolver = LocatorResolver::default();
    assert!(resolver
        .resolve("Login button", &before)
        .unwrap()
        .has_confirmed());
    assert!(resolver.resolve("Login button", &after).unwrap().is_empty());
}
