#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use intranet_api::clock::ManualClock;
use intranet_api::otp::{OtpAuthenticator, OtpPolicy};
use intranet_api::submission::{SubmissionGate, SubmissionPolicy};
use intranet_crypto::source::SourceHasher;
use intranet_db::Database;
use intranet_sms::{DeliveryReport, SmsSender};

pub const PHONE: &str = "0241234567";
pub const CANONICAL_PHONE: &str = "+233241234567";
pub const START: i64 = 1_700_000_000;

/// Records every message; optionally reports each send as failed.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingSender {
    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// The code in the most recent message to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(dest, _)| dest == to)
            .and_then(|(_, body)| extract_code(&body))
    }
}

#[async_trait]
impl SmsSender for RecordingSender {
    async fn send(&self, to: &str, body: &str) -> DeliveryReport {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            DeliveryReport::failed("carrier unavailable")
        } else {
            DeliveryReport::delivered()
        }
    }
}

pub fn extract_code(body: &str) -> Option<String> {
    body.split(|c: char| !c.is_ascii_digit())
        .find(|chunk| chunk.len() == 6)
        .map(str::to_string)
}

/// A code guaranteed to differ from `code`.
pub fn wrong_code(code: &str) -> &'static str {
    if code == "111111" { "222222" } else { "111111" }
}

pub struct Harness {
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub sms: Arc<RecordingSender>,
    pub otp: OtpAuthenticator,
    pub gate: SubmissionGate,
    pub hasher: SourceHasher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policies(OtpPolicy::default(), SubmissionPolicy::default())
    }

    pub fn with_policies(otp_policy: OtpPolicy, submission_policy: SubmissionPolicy) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::at(START));
        let sms = Arc::new(RecordingSender::default());

        let otp = OtpAuthenticator::new(db.clone(), db.clone(), sms.clone(), clock.clone(), otp_policy);
        let gate = SubmissionGate::new(db.clone(), db.clone(), clock.clone(), submission_policy);

        Self {
            db,
            clock,
            sms,
            otp,
            gate,
            hasher: SourceHasher::new(b"test-pepper-0123456789").unwrap(),
        }
    }

    pub fn register(&self, phone: &str, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.db
            .create_account(&id.to_string(), phone, "Kofi Boateng", role, true)
            .unwrap();
        id
    }

    /// Request a code and wait for its delivery; returns the code sent.
    pub async fn issue_code(&self, phone: &str) -> String {
        let issued = self.otp.request_code(phone).await.unwrap();
        issued.delivery.await.unwrap();
        self.sms.last_code_for(&issued.identifier).unwrap()
    }
}
