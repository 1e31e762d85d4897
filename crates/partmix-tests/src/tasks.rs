//! Track tasks against in-memory stores, from upload to refreshed mix.

use crate::support::{constant, decode, sine, Studio, QUARTET, SAMPLE_RATE};
use partmix_core::MixSpec;
use partmix_tasks::{
    CreateMixRequest, MediaStore, ProcessUploadRequest, RefreshMixRequest, TaskError, TaskRequest,
    TaskStatus, TrackKind, TrackStore,
};

/// Upload every quartet part through the executor.
fn upload_quartet(studio: &Studio, frames: usize) {
    let handles: Vec<_> = QUARTET
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let upload = studio.stage_upload(part, &sine(110.0 * (i + 1) as f32, frames));
            studio
                .executor
                .schedule(ProcessUploadRequest {
                    target: Studio::key(part),
                    upload,
                })
                .unwrap()
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.wait().unwrap().status, TaskStatus::Succeeded);
    }
}

fn create_request(track: &str, description: &str) -> CreateMixRequest {
    CreateMixRequest {
        target: Studio::key(track),
        description: description.into(),
        parts: QUARTET.iter().map(|p| p.to_string()).collect(),
        pitch_shift: 0,
        speed_factor: 1.0,
    }
}

#[test]
fn uploads_become_part_media() {
    let studio = Studio::new();
    upload_quartet(&studio, 4410);

    for part in QUARTET {
        let track = studio.track(part);
        assert_eq!(track.kind, TrackKind::Part);
        assert!(!track.is_locked());
        assert_eq!(track.duration_secs, Some(0.1));
        let media = track.media.unwrap();
        assert!(media.as_str().starts_with(&format!("songs/song-1/tracks/{part}/")));
        assert!(studio.media.exists(&media).unwrap());
    }
}

#[test]
fn create_mix_renders_and_records_the_spec() {
    let studio = Studio::new();
    upload_quartet(&studio, SAMPLE_RATE as usize / 2);

    let record = studio
        .executor
        .schedule(create_request("bari-left", "Bari left"))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(record.status, TaskStatus::Succeeded, "{:?}", record.error);
    assert_eq!(record.result.as_ref().unwrap()["channels"], 2);

    let track = studio.track("bari-left");
    assert_eq!(track.kind, TrackKind::Mix);
    assert!(!track.is_locked());
    assert_eq!(track.duration_secs, Some(0.5));
    assert!(matches!(track.mix_spec, Some(MixSpec::Stereo(_))));
    let (format, bytes) = studio.media.get_bytes(&track.media.unwrap()).unwrap();
    assert_eq!(format.channels, 2);
    assert_eq!(bytes.len(), SAMPLE_RATE as usize / 2 * 4);
}

#[test]
fn create_mix_with_unknown_part_fails_at_schedule() {
    let studio = Studio::new();
    studio.add_part("tenor", &constant(0.2, 100));
    studio.add_part("lead", &constant(0.2, 100));

    let err = studio
        .executor
        .schedule(create_request("full", "Full mix"))
        .unwrap_err();
    assert!(matches!(err, TaskError::Precondition(_)), "{err}");
    assert!(studio.tasks.all().is_empty());
    assert!(studio
        .tracks
        .get_track(&Studio::key("full"))
        .unwrap()
        .is_none());
}

#[test]
fn create_mix_with_bad_description_fails_at_schedule() {
    let studio = Studio::new();
    for part in QUARTET {
        studio.add_part(part, &constant(0.1, 100));
    }
    let err = studio
        .executor
        .schedule(create_request("odd", "karaoke night"))
        .unwrap_err();
    assert!(matches!(err, TaskError::Audio(_)), "{err}");
    assert!(studio.tasks.all().is_empty());
}

#[test]
fn create_mix_refuses_existing_track() {
    let studio = Studio::new();
    for part in QUARTET {
        studio.add_part(part, &constant(0.1, 100));
    }
    let mut request = create_request("tenor", "Full mix");
    request.parts = vec!["lead".into(), "bari".into()];
    assert!(matches!(
        studio.executor.schedule(request),
        Err(TaskError::Precondition(_))
    ));
}

#[test]
fn racing_creates_of_one_mix_only_one_succeeds() {
    let studio = Studio::new();
    for part in QUARTET {
        studio.add_part(part, &constant(0.2, 2000));
    }

    let outcomes: Vec<_> = ["Full mix", "Tenor solo"]
        .iter()
        .map(|description| studio.executor.schedule(create_request("full", description)))
        .collect();
    let mut winners = Vec::new();
    let mut refused = 0;
    for outcome in outcomes {
        match outcome {
            // The second request may only be validated after the first finished.
            Err(TaskError::Precondition(_)) => refused += 1,
            Err(e) => panic!("unexpected scheduling error: {e}"),
            Ok(handle) => {
                let record = handle.wait().unwrap();
                match record.status {
                    TaskStatus::Succeeded => winners.push(record),
                    TaskStatus::Failed => {
                        assert!(record.error.as_deref().unwrap().contains("already exists"));
                        refused += 1;
                    }
                    other => panic!("task ended {other:?}"),
                }
            }
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(refused, 1);

    let winner = &winners[0];
    let track = studio.track("full");
    assert!(!track.is_locked());
    assert_eq!(
        track.media.as_ref().unwrap().as_str(),
        winner.result.as_ref().unwrap()["media"].as_str().unwrap()
    );
    let TaskRequest::CreateMix(request) = &winner.request else {
        panic!("winner was not a create request");
    };
    assert_eq!(track.mix_description.as_deref(), Some(request.description.as_str()));
}

#[test]
fn refresh_applies_speed_override() {
    let studio = Studio::new();
    for part in QUARTET {
        studio.add_part(part, &sine(220.0, SAMPLE_RATE as usize));
    }
    let created = studio
        .executor
        .schedule(create_request("full", "Full mix"))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(created.status, TaskStatus::Succeeded, "{:?}", created.error);
    let before = studio.track("full");
    assert_eq!(before.duration_secs, Some(1.0));

    let refreshed = studio
        .executor
        .schedule(RefreshMixRequest {
            target: Studio::key("full"),
            speed_factor: Some(2.0),
            ..Default::default()
        })
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(refreshed.status, TaskStatus::Succeeded, "{:?}", refreshed.error);

    let after = studio.track("full");
    assert_eq!(after.speed_factor, 2.0);
    assert_eq!(after.mix_description.as_deref(), Some("Full mix"));
    assert_ne!(after.media, before.media);
    let duration = after.duration_secs.unwrap();
    assert!((0.5..1.0).contains(&duration), "duration {duration}");
    // The old render is left in place.
    assert!(studio.media.exists(&before.media.unwrap()).unwrap());
}

#[test]
fn refresh_rejects_out_of_range_pitch() {
    let studio = Studio::new();
    for part in QUARTET {
        studio.add_part(part, &constant(0.1, 100));
    }
    studio
        .executor
        .schedule(create_request("full", "Full mix"))
        .unwrap()
        .wait()
        .unwrap();
    let err = studio
        .executor
        .schedule(RefreshMixRequest {
            target: Studio::key("full"),
            pitch_shift: Some(12),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, TaskError::Audio(_)), "{err}");
}

#[test]
fn concurrent_refreshes_of_one_mix_all_succeed() {
    let studio = Studio::new();
    for part in QUARTET {
        studio.add_part(part, &constant(0.25, 2000));
    }
    studio
        .executor
        .schedule(create_request("full", "Full mix"))
        .unwrap()
        .wait()
        .unwrap();

    let handles: Vec<_> = ["Tenor solo", "Lead predom", "Bass missing"]
        .iter()
        .map(|description| {
            studio
                .executor
                .schedule(RefreshMixRequest {
                    target: Studio::key("full"),
                    description: Some(description.to_string()),
                    ..Default::default()
                })
                .unwrap()
        })
        .collect();
    let mut ended = Vec::new();
    for handle in handles {
        let record = handle.wait().unwrap();
        assert_eq!(record.status, TaskStatus::Succeeded, "{:?}", record.error);
        ended.push(record);
    }

    let track = studio.track("full");
    assert!(!track.is_locked());
    // The track points at the output of one of the refreshes.
    let media = track.media.as_ref().unwrap().as_str();
    assert!(ended
        .iter()
        .any(|r| r.result.as_ref().unwrap()["media"].as_str() == Some(media)));
    let (_, bytes) = studio.media.get_bytes(track.media.as_ref().unwrap()).unwrap();
    let samples = decode(&bytes);
    assert_eq!(samples.len(), 4000);
}

#[tokio::test]
async fn handles_can_be_awaited() {
    let studio = Studio::new();
    let upload = studio.stage_upload("tenor", &constant(0.5, 800));
    let record = studio
        .executor
        .schedule(ProcessUploadRequest {
            target: Studio::key("tenor"),
            upload,
        })
        .unwrap()
        .await
        .unwrap();
    assert_eq!(record.status, TaskStatus::Succeeded);
    assert_eq!(record.result.unwrap()["frames"], 800);
}
