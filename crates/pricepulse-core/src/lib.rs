// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for PricePulse insight delivery.
//!
//! This crate provides the domain types, error types, and the trait seams
//! through which the scheduler and the delivery router reach their external
//! collaborators (stores, channel senders, alerting, clock, locks).

pub mod error;
pub mod traits;
pub mod types;

pub use error::{PulseError, SendError};
pub use types::{
    AdapterType, Alert, AttemptOutcome, Channel, ChannelAttempt, ClaimOutcome, ClaimRequest,
    DeliveryJob, DeliveryStats, Frequency, HealthStatus, JobId, JobStatus, MessageId,
    NotificationPreference, PayloadLookup, PayloadRef, ProductId, TrackedProduct,
    TrackedProductId, TrackingStatus, UserId,
};

pub use traits::{
    AlertSink, AnalysisStore, ChannelSender, Clock, ContactDirectory, JobStore, LockProvider,
    PluginAdapter, StorageAdapter, SystemClock, TrackingStore,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn channel_display_and_parse_round_trip() {
        for channel in Channel::ALL {
            let s = channel.to_string();
            assert_eq!(Channel::from_str(&s).unwrap(), channel);
        }
        assert_eq!(Channel::WhatsApp.to_string(), "whatsapp");
    }

    #[test]
    fn channel_serializes_lowercase() {
        let json = serde_json::to_string(&Channel::WhatsApp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
    }

    #[test]
    fn job_status_strings_are_snake_case() {
        assert_eq!(JobStatus::InFlight.to_string(), "in_flight");
        assert_eq!(JobStatus::from_str("in_flight").unwrap(), JobStatus::InFlight);
    }

    #[test]
    fn job_state_machine_edges() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Delivered));
        assert!(InFlight.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Abandoned));

        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Abandoned.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(InFlight));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Delivered.is_terminal());
        assert!(JobStatus::Abandoned.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn send_error_classification() {
        let transient = SendError::Transient("429".into());
        let permanent = SendError::Permanent("token revoked".into());
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert_eq!(transient.outcome(), AttemptOutcome::TransientFailure);
        assert_eq!(permanent.outcome(), AttemptOutcome::PermanentFailure);
        assert_eq!(permanent.reason(), "token revoked");
    }

    #[test]
    fn job_success_rate_ignores_unfinished_jobs() {
        let stats = DeliveryStats {
            jobs_by_status: vec![
                (JobStatus::Delivered, 99),
                (JobStatus::Failed, 1),
                (JobStatus::Pending, 50),
            ],
            ..Default::default()
        };
        assert_eq!(stats.job_success_rate(), Some(0.99));
        assert_eq!(DeliveryStats::default().job_success_rate(), None);
    }

    #[test]
    fn alert_display_names_channels() {
        let alert = Alert::JobFailed {
            job_id: JobId::from("job-1"),
            user_id: UserId::from("user-1"),
            product_id: ProductId::from("sku-1"),
            channels: vec![Channel::Push, Channel::Email],
            attempts: 4,
        };
        let text = alert.to_string();
        assert!(text.contains("job-1"));
        assert!(text.contains("push, email"));
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_sender<T: ChannelSender>() {}
        fn _assert_alert_sink<T: AlertSink>() {}
        fn _assert_storage<T: StorageAdapter>() {}
        fn _assert_tracking<T: TrackingStore>() {}
        fn _assert_analysis<T: AnalysisStore>() {}
        fn _assert_jobs<T: JobStore>() {}
        fn _assert_lock<T: LockProvider>() {}
        fn _assert_contacts<T: ContactDirectory>() {}
        fn _assert_clock<T: Clock>() {}
    }
}
