//! Conference backend walkthrough.
//!
//! Runs against `PostgreSQL` when `DATABASE_URL` is set, otherwise against the
//! in-memory store:
//!
//! 1. an organizer creates a conference, a speaker and two sessions
//! 2. attendees register until the conference is nearly sold out
//! 3. attendees build wishlists
//! 4. filtered conference queries run through the filter compiler
//! 5. queued tasks run and the caches are read back
//! 6. the conference is deleted and the cascade cleans up

use anyhow::Result;
use conference_core::entity::SessionType;
use conference_core::filter::RawFilter;
use conference_core::store::EntityStore;
use conference_postgres::PostgresEntityStore;
use conference_runtime::conferences::NewConference;
use conference_runtime::sessions::NewSession;
use conference_runtime::speakers::NewSpeaker;
use conference_runtime::{ConferenceConfig, ConferenceEnvironment, ConferenceService, metrics};
use conference_testing::fixtures::caller;
use conference_testing::{InMemoryCache, InMemoryEntityStore, RecordingTaskQueue, StaticIdentityResolver};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConferenceConfig::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_target(false)
        .init();
    metrics::register_metrics();

    let store: Arc<dyn EntityStore> = match &config.database {
        Some(database) => {
            info!("Connecting to PostgreSQL");
            let store = PostgresEntityStore::connect(
                &database.url,
                database.max_connections,
                Duration::from_secs(database.connect_timeout),
            )
            .await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, using the in-memory store");
            Arc::new(InMemoryEntityStore::new())
        }
    };

    let organizer = caller("organizer");
    let tasks = RecordingTaskQueue::new();
    let env = ConferenceEnvironment::new(
        store,
        Arc::new(InMemoryCache::new()),
        Arc::new(tasks.clone()),
        Arc::new(StaticIdentityResolver::new().with_token("demo-token", organizer)),
    )
    .with_retry_policy(config.retry_policy());
    let service = ConferenceService::new(env);

    let organizer = service.authenticate(Some("demo-token")).await?;
    let conference = service
        .conferences()
        .create_conference(
            &organizer,
            NewConference {
                name: "RustConf".to_string(),
                city: Some("Montreal".to_string()),
                start_date: Some("2026-09-08".to_string()),
                end_date: Some("2026-09-11".to_string()),
                max_attendees: Some(8),
                ..NewConference::default()
            },
        )
        .await?;
    let conference_ref = conference.key.to_reference();
    info!(conference = %conference.key, month = conference.value.month, "Created conference");

    let speaker = service
        .speakers()
        .create_speaker(NewSpeaker {
            display_name: Some("Ada".to_string()),
            main_email: "ada@example.com".to_string(),
        })
        .await?;
    let speaker_ref = speaker.key.to_reference();

    let mut sessions = Vec::new();
    for (name, start, kind) in [
        ("Async in Depth", "09:30 AM", SessionType::Lecture),
        ("Hands-on Borrowing", "02:00 PM", SessionType::Workshop),
    ] {
        let session = service
            .linkage()
            .create_session(
                &organizer,
                &conference_ref,
                NewSession {
                    name: name.to_string(),
                    speaker: Some(speaker_ref.clone()),
                    start_time: Some(start.to_string()),
                    type_of_session: Some(kind),
                    ..NewSession::default()
                },
            )
            .await?;
        sessions.push(session.key.to_reference());
    }
    info!(sessions = sessions.len(), "Created sessions");

    for n in 0..4 {
        let attendee = caller(&format!("attendee-{n}"));
        service.registration().register(&attendee, &conference_ref).await?;
        service.wishlists().add_session(&attendee, &sessions[n % 2]).await?;
    }
    info!(announcement = %service.announcements().get_announcement().await, "After registrations");

    let matches = service
        .conferences()
        .query_conferences(&[
            RawFilter::new("MONTH", "GT", "6"),
            RawFilter::new("CITY", "EQ", "Montreal"),
        ])
        .await?;
    info!(matches = matches.len(), "Filtered conferences");

    if let Err(error) = service
        .conferences()
        .query_conferences(&[
            RawFilter::new("MONTH", "GT", "6"),
            RawFilter::new("MAX_ATTENDEES", "LT", "50"),
        ])
        .await
    {
        info!(%error, "Rejected filter set");
    }

    for task in tasks.tasks() {
        service.run_task(&task).await?;
    }
    info!(
        summary = %service.announcements().get_speaker_summary(&speaker_ref, &conference_ref).await,
        "Speaker summary"
    );

    let daytime = service.sessions().daytime_non_workshop_sessions().await?;
    info!(sessions = daytime.len(), "Daytime non-workshop sessions");

    service
        .linkage()
        .delete_conference(&organizer, &conference_ref)
        .await?;
    let attending = service
        .conferences()
        .conferences_to_attend(&caller("attendee-0"))
        .await?;
    let wishlist = service.wishlists().list(&caller("attendee-0")).await?;
    info!(
        attending = attending.len(),
        wishlist = wishlist.len(),
        announcement = %service.announcements().get_announcement().await,
        "After conference delete"
    );

    Ok(())
}
