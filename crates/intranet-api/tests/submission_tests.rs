mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Duration};
use proptest::prelude::*;

use common::{Harness, START};
use intranet_api::submission::{SubmissionError, SubmissionInput, SubmissionPolicy, SubmitOutcome};
use intranet_api::otp::OtpPolicy;

const CATEGORY: &str = "cat-123";

fn harness() -> Harness {
    let h = Harness::new();
    h.db.create_category(CATEGORY, "Facilities").unwrap();
    h
}

fn input(content: &str) -> SubmissionInput {
    SubmissionInput {
        content: content.to_string(),
        category_id: CATEGORY.to_string(),
        honeypot: None,
    }
}

#[test]
fn stored_suggestion_has_no_source_reference() {
    let h = harness();
    let hash_a = h.hasher.hash("10.0.0.7");

    let outcome = h.gate.submit(&input("Great idea about parking"), &hash_a).unwrap();
    assert_eq!(outcome, SubmitOutcome::Stored { remaining: 4 });

    let rows = h.db.list_suggestions(10, None).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.content, "Great idea about parking");
    assert_eq!(row.category_id, CATEGORY);
    assert_eq!(row.category_name, "Facilities");
    assert_eq!(row.submitted_at, START);
    for field in [&row.id, &row.content, &row.category_id, &row.category_name] {
        assert!(!field.contains(&hash_a));
        assert!(!field.contains("10.0.0.7"));
    }
}

#[test]
fn short_content_is_rejected() {
    let h = harness();
    let hash_a = h.hasher.hash("10.0.0.7");

    match h.gate.submit(&input("hi"), &hash_a) {
        Err(SubmissionError::TooShort { min_len, actual }) => {
            assert_eq!(min_len, 10);
            assert_eq!(actual, 2);
        }
        other => panic!("expected TooShort, got {:?}", other),
    }
}

#[test]
fn length_is_measured_after_trimming_in_characters() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    assert!(matches!(
        h.gate.submit(&input("      short     "), &hash),
        Err(SubmissionError::TooShort { actual: 5, .. })
    ));

    // Ten multi-byte characters meet the minimum.
    assert!(h.gate.submit(&input("ééééééééé€"), &hash).is_ok());
}

#[test]
fn long_content_is_rejected() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    let content = "x".repeat(2001);
    assert!(matches!(
        h.gate.submit(&input(&content), &hash),
        Err(SubmissionError::TooLong { max_len: 2000, actual: 2001 })
    ));
    assert!(h.gate.submit(&input(&"x".repeat(2000)), &hash).is_ok());
}

#[test]
fn unknown_or_inactive_category_is_rejected() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    let mut unknown = input("A perfectly fine suggestion");
    unknown.category_id = "cat-999".to_string();
    assert!(matches!(
        h.gate.submit(&unknown, &hash),
        Err(SubmissionError::InvalidCategory)
    ));

    h.db.set_category_active(CATEGORY, false).unwrap();
    assert!(matches!(
        h.gate.submit(&input("A perfectly fine suggestion"), &hash),
        Err(SubmissionError::InvalidCategory)
    ));
}

#[test]
fn sixth_submission_in_window_is_rate_limited() {
    let h = harness();
    let hash_b = h.hasher.hash("10.0.0.8");

    for expected_remaining in (0..5).rev() {
        let outcome = h.gate.submit(&input("Better coffee in the kitchen"), &hash_b).unwrap();
        assert_eq!(outcome, SubmitOutcome::Stored { remaining: expected_remaining });
        h.clock.advance(Duration::seconds(30));
    }

    let window_end = DateTime::from_timestamp(START - START % 3600 + 3600, 0).unwrap();
    match h.gate.submit(&input("Better coffee in the kitchen"), &hash_b) {
        Err(SubmissionError::RateLimited { resets_at }) => assert_eq!(resets_at, window_end),
        other => panic!("expected RateLimited, got {:?}", other),
    }

    let status = h.gate.check_rate_limit(&hash_b).unwrap();
    assert!(!status.allowed);
    assert_eq!(status.remaining, 0);
    assert_eq!(status.resets_at, window_end);
    assert_eq!(h.db.count_suggestions().unwrap(), 5);
}

#[test]
fn limit_is_per_source() {
    let h = harness();
    let a = h.hasher.hash("10.0.0.7");
    let b = h.hasher.hash("10.0.0.8");

    for _ in 0..5 {
        h.gate.submit(&input("Longer lunch breaks please"), &a).unwrap();
    }
    assert!(matches!(
        h.gate.submit(&input("Longer lunch breaks please"), &a),
        Err(SubmissionError::RateLimited { .. })
    ));
    assert!(h.gate.submit(&input("Longer lunch breaks please"), &b).is_ok());
}

#[test]
fn next_window_resets_the_count() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    for _ in 0..5 {
        h.gate.submit(&input("More bike racks outside"), &hash).unwrap();
    }
    let resets_at = h.gate.check_rate_limit(&hash).unwrap().resets_at;

    h.clock.set(resets_at - Duration::seconds(1));
    assert!(h.gate.submit(&input("More bike racks outside"), &hash).is_err());

    h.clock.set(resets_at);
    assert_eq!(
        h.gate.submit(&input("More bike racks outside"), &hash).unwrap(),
        SubmitOutcome::Stored { remaining: 4 }
    );
}

#[test]
fn checking_the_limit_does_not_use_a_slot() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    for _ in 0..10 {
        let status = h.gate.check_rate_limit(&hash).unwrap();
        assert!(status.allowed);
        assert_eq!(status.remaining, 5);
    }
    assert!(h.db.get_rate_window(&hash).unwrap().is_none());
}

#[test]
fn honeypot_submission_is_discarded_silently() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    let mut bot = input("Buy cheap watches at example dot com");
    bot.honeypot = Some("http://spam.example".to_string());

    assert_eq!(h.gate.submit(&bot, &hash).unwrap(), SubmitOutcome::Discarded);
    assert_eq!(h.db.count_suggestions().unwrap(), 0);
    assert_eq!(h.gate.check_rate_limit(&hash).unwrap().remaining, 5);

    // Invalid content behind a filled honeypot is still just discarded.
    bot.content = "x".to_string();
    assert_eq!(h.gate.submit(&bot, &hash).unwrap(), SubmitOutcome::Discarded);
}

#[test]
fn blank_honeypot_counts_as_empty() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    let mut form = input("Quieter printers on floor two");
    form.honeypot = Some("   ".to_string());
    assert!(matches!(h.gate.submit(&form, &hash).unwrap(), SubmitOutcome::Stored { .. }));
}

#[test]
fn rejected_submission_does_not_use_a_slot() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.7");

    let _ = h.gate.submit(&input("hi"), &hash);
    let mut bad_category = input("A perfectly fine suggestion");
    bad_category.category_id = "nope".to_string();
    let _ = h.gate.submit(&bad_category, &hash);

    assert_eq!(h.gate.check_rate_limit(&hash).unwrap().remaining, 5);
}

#[test]
fn concurrent_submissions_never_exceed_the_limit() {
    let h = harness();
    let hash = h.hasher.hash("10.0.0.9");
    let accepted = AtomicU32::new(0);
    let limited = AtomicU32::new(0);

    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| match h.gate.submit(&input("Flexible hours on Fridays"), &hash) {
                Ok(SubmitOutcome::Stored { .. }) => {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
                Err(SubmissionError::RateLimited { .. }) => {
                    limited.fetch_add(1, Ordering::SeqCst);
                }
                other => panic!("unexpected outcome {:?}", other),
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), 5);
    assert_eq!(limited.load(Ordering::SeqCst), 11);
    assert_eq!(h.db.count_suggestions().unwrap(), 5);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stored_rows_never_contain_a_source(
        submissions in prop::collection::vec(
            (
                "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
                "[a-zA-Z ]{10,80}",
            ),
            1..40,
        ),
    ) {
        let h = Harness::with_policies(
            OtpPolicy::default(),
            SubmissionPolicy { max_per_window: 1000, ..SubmissionPolicy::default() },
        );
        h.db.create_category(CATEGORY, "Facilities").unwrap();

        let mut sources = Vec::new();
        for (ip, content) in &submissions {
            let hash = h.hasher.hash(ip);
            if let Ok(SubmitOutcome::Stored { .. }) = h.gate.submit(&input(content), &hash) {
                sources.push((ip.clone(), hash));
            }
            h.clock.advance(Duration::seconds(1));
        }

        let rows = h.db.list_suggestions(1000, None).unwrap();
        prop_assert_eq!(rows.len(), sources.len());
        for row in &rows {
            for field in [&row.id, &row.content, &row.category_id, &row.category_name] {
                for (ip, hash) in &sources {
                    prop_assert!(!field.contains(hash.as_str()));
                    // Content is letters and spaces, so a dotted address can only leak from elsewhere.
                    prop_assert!(!field.contains(ip.as_str()));
                }
            }
        }
    }
}
