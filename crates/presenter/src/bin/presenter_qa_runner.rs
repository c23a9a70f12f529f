use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing_subscriber::EnvFilter;

use parley_collab::{
    AttachmentId, ConversationId, ImageAttachment, InMemoryCapture, InMemorySearch, Message,
    MessageId, MessageList, SearchHit, SearchQuery, UserId, VideoAttachment,
};
use parley_presenter::{
    ChannelSnapshot, GestureEvent, GroupingContext, MediaAttachments, MessageListPresenter, Point,
    PresenterSettings, RecordingError, RecordingState, RenderSkipFilter, SettingsStore,
    UnreadMarker, ViewportState, VoiceRecorder, group_messages,
};

const BASE_TIMESTAMP: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    Grouping,
    RenderSkip,
    Unread,
    Media,
    Recording,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "grouping" => Some(Self::Grouping),
            "render_skip" => Some(Self::RenderSkip),
            "unread" => Some(Self::Unread),
            "media" => Some(Self::Media),
            "recording" => Some(Self::Recording),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Grouping => "grouping",
            Self::RenderSkip => "render_skip",
            Self::Unread => "unread",
            Self::Media => "media",
            Self::Recording => "recording",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("fixture timestamp {seconds} is out of range"))]
    InvalidTimestamp { stage: &'static str, seconds: i64 },
    #[snafu(display("voice recorder failed: {source}"))]
    Recorder {
        stage: &'static str,
        source: RecordingError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries the key=value report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    let config_path = args
        .config_path
        .unwrap_or_else(SettingsStore::default_config_path);
    let store = SettingsStore::new(config_path);
    println!("config_path={}", store.config_path().display());
    let settings = store.settings();

    match args.scenario {
        Scenario::Grouping => run_grouping(&settings),
        Scenario::RenderSkip => run_render_skip(&settings),
        Scenario::Unread => run_unread(),
        Scenario::Media => run_media(&settings).await,
        Scenario::Recording => run_recording(&settings).await,
        Scenario::All => run_all(&settings).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut config_path = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            "--config" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-config-value",
                    arg: "--config",
                })?;
                config_path = Some(PathBuf::from(value));
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
        config_path,
    })
}

async fn run_all(settings: &PresenterSettings) -> RunnerResult<()> {
    run_grouping(settings)?;
    run_render_skip(settings)?;
    run_unread()?;
    run_media(settings).await?;
    run_recording(settings).await?;

    println!("all_passed=true");
    Ok(())
}

fn run_grouping(settings: &PresenterSettings) -> RunnerResult<()> {
    let list = MessageList::newest_first(vec![
        message("m4", "u1", 120)?,
        message("m3", "u1", 110)?,
        message("m2", "me", 50)?,
        message("m1", "u1", 20)?,
        message("m0", "u1", 0)?,
    ]);
    let context = GroupingContext::new(UserId::new("me"), 3, &settings.grouping);
    let info = group_messages(&list, &context);

    let first_ids = sorted_ids(
        info.iter()
            .filter(|(_, tags)| tags.first_in_group)
            .map(|(id, _)| id),
    );
    let last_ids = sorted_ids(
        info.iter()
            .filter(|(_, tags)| tags.last_in_group)
            .map(|(id, _)| id),
    );
    println!("grouping_first={}", first_ids.join(","));
    println!("grouping_last={}", last_ids.join(","));

    ensure!(
        first_ids == ["m0", "m2", "m3"] && last_ids == ["m1", "m2", "m4"],
        ScenarioFailedSnafu {
            stage: "scenario-grouping-tags",
            scenario: "grouping",
            reason: "group boundaries do not follow author changes",
        }
    );
    ensure!(
        info.shows_last_in_group_header(&MessageId::new("m4"))
            && !info.shows_last_in_group_header(&MessageId::new("m2")),
        ScenarioFailedSnafu {
            stage: "scenario-grouping-header",
            scenario: "grouping",
            reason: "header tag applied to the wrong messages",
        }
    );

    println!("runner_ok=true");
    Ok(())
}

fn run_render_skip(settings: &PresenterSettings) -> RunnerResult<()> {
    let mut filter = RenderSkipFilter::new();
    let settled = MessageList::newest_first(vec![message("B", "u1", 20)?, message("C", "u1", 10)?]);
    filter.adopt(settled.newest());

    let arrived = MessageList::newest_first(vec![
        message("A", "u2", 30)?,
        message("B", "u1", 20)?,
        message("C", "u1", 10)?,
    ]);
    let (visible, skipped) = filter.apply(&arrived);
    println!("render_skip_skipped={}", skipped.len());
    println!("render_skip_visible={}", visible.len());
    ensure!(
        skipped.contains(&MessageId::new("A")) && visible.len() == 2,
        ScenarioFailedSnafu {
            stage: "scenario-render-skip-hold",
            scenario: "render_skip",
            reason: "new arrival above the cursor was not held back",
        }
    );

    let mut presenter = MessageListPresenter::new(UserId::new("me"), settings);
    let snapshot = ChannelSnapshot {
        list: arrived,
        unread_count: 1,
        member_count: 2,
    };
    let presentation = presenter.apply_snapshot(
        &snapshot,
        &ViewportState {
            showing_latest: true,
            jump_target: None,
        },
    );
    println!("render_skip_latest_skipped={}", presentation.skipped.len());
    ensure!(
        presentation.skipped.is_empty(),
        ScenarioFailedSnafu {
            stage: "scenario-render-skip-latest",
            scenario: "render_skip",
            reason: "viewing the latest messages still hid arrivals",
        }
    );

    println!("runner_ok=true");
    Ok(())
}

fn run_unread() -> RunnerResult<()> {
    let messages = (0..10)
        .map(|index| message(&format!("m{index}"), "u1", 1_000 - index))
        .collect::<RunnerResult<Vec<_>>>()?;
    let list = MessageList::newest_first(messages);

    let mut marker = UnreadMarker::default();
    let anchor = marker
        .update(3, &list)
        .map(|separator| separator.message_id.to_string());
    println!("unread_anchor={}", anchor.as_deref().unwrap_or("none"));
    ensure!(
        anchor.as_deref() == Some("m2"),
        ScenarioFailedSnafu {
            stage: "scenario-unread-anchor",
            scenario: "unread",
            reason: "separator not anchored at unread_count - 1",
        }
    );

    let dismissed = marker.dismiss();
    let hidden = marker.update(3, &list).is_none();
    println!("unread_dismissed={dismissed}");
    ensure!(
        dismissed && hidden,
        ScenarioFailedSnafu {
            stage: "scenario-unread-dismiss",
            scenario: "unread",
            reason: "dismissed separator came back without a new unread event",
        }
    );

    println!("runner_ok=true");
    Ok(())
}

async fn run_media(settings: &PresenterSettings) -> RunnerResult<()> {
    let hits = (0..60).map(media_hit).collect::<Vec<_>>();
    let search = InMemorySearch::new(hits, settings.media.page_size);
    let mut media = MediaAttachments::new(Arc::new(search.clone()), settings.media.clone());

    let initial = media.load(SearchQuery::media("c1"));
    media.drive(initial).await;
    println!("media_items_after_load={}", media.items().len());

    let near_end = media.items().len().saturating_sub(1);
    let first_more = media.on_item_visible(near_end);
    let second_more = media.on_item_visible(near_end);
    println!("media_duplicate_fetch={}", second_more.is_some());
    ensure!(
        first_more.is_some() && second_more.is_none(),
        ScenarioFailedSnafu {
            stage: "scenario-media-single-flight",
            scenario: "media",
            reason: "a second page request was issued while one was in flight",
        }
    );

    if let Some(pending) = first_more {
        media.drive(pending).await;
    }
    while let Some(pending) = media.load_more() {
        media.drive(pending).await;
    }

    println!("media_items_total={}", media.items().len());
    println!("media_images={}", media.all_image_attachments().len());
    println!("media_requests={}", search.issued_requests());
    ensure!(
        !media.has_more() && media.items().len() == 80,
        ScenarioFailedSnafu {
            stage: "scenario-media-exhausted",
            scenario: "media",
            reason: format!("expected 80 items, got {}", media.items().len()),
        }
    );

    println!("runner_ok=true");
    Ok(())
}

async fn run_recording(settings: &PresenterSettings) -> RunnerResult<()> {
    let capture = InMemoryCapture::new();
    let mut recorder = VoiceRecorder::new(Arc::new(capture.clone()), settings.recording.clone());

    send(&mut recorder, GestureEvent::Press { at: millis(0) }).await?;
    send(&mut recorder, GestureEvent::Release { at: millis(300) }).await?;
    println!("recording_quick_tap_state={:?}", recorder.state());
    ensure!(
        recorder.state() == &RecordingState::ShowingTip && capture.calls().is_empty(),
        ScenarioFailedSnafu {
            stage: "scenario-recording-quick-tap",
            scenario: "recording",
            reason: "a quick tap started capture",
        }
    );

    send(&mut recorder, GestureEvent::Press { at: millis(1_000) }).await?;
    send(&mut recorder, GestureEvent::Tick { at: millis(1_500) }).await?;
    send(
        &mut recorder,
        GestureEvent::Drag {
            at: millis(1_700),
            location: Point::new(0.0, -80.0),
        },
    )
    .await?;
    send(
        &mut recorder,
        GestureEvent::Drag {
            at: millis(1_800),
            location: Point::ORIGIN,
        },
    )
    .await?;
    send(&mut recorder, GestureEvent::Release { at: millis(1_900) }).await?;
    println!("recording_locked_state={:?}", recorder.state());
    ensure!(
        recorder.state() == &RecordingState::Locked,
        ScenarioFailedSnafu {
            stage: "scenario-recording-lock",
            scenario: "recording",
            reason: "lock did not survive the returning drag",
        }
    );

    capture.emit_capture_sample(millis(900), 0.5);
    recorder.poll_telemetry();
    send(&mut recorder, GestureEvent::StopTap).await?;
    send(&mut recorder, GestureEvent::Discard).await?;
    println!("recording_live_assets={}", capture.live_asset_count());
    ensure!(
        recorder.state() == &RecordingState::Idle && capture.live_asset_count() == 0,
        ScenarioFailedSnafu {
            stage: "scenario-recording-discard",
            scenario: "recording",
            reason: "discarded recording left an asset behind",
        }
    );

    println!("runner_ok=true");
    Ok(())
}

async fn send(recorder: &mut VoiceRecorder, event: GestureEvent) -> RunnerResult<()> {
    recorder.handle(event).await.context(RecorderSnafu {
        stage: "scenario-recording-event",
    })?;
    Ok(())
}

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn message(id: &str, author: &str, offset_seconds: i64) -> RunnerResult<Message> {
    let seconds = BASE_TIMESTAMP + offset_seconds;
    let created_at = DateTime::<Utc>::from_timestamp(seconds, 0).context(InvalidTimestampSnafu {
        stage: "fixture-message-timestamp",
        seconds,
    })?;
    Ok(Message::new(id, author, "c1", created_at))
}

fn media_hit(index: usize) -> SearchHit {
    let videos = if index % 3 == 0 {
        vec![VideoAttachment {
            id: AttachmentId::new(format!("vid-{index}")),
            url: format!("https://cdn.example/{index}.mp4"),
            thumbnail_url: None,
        }]
    } else {
        Vec::new()
    };

    SearchHit {
        message_id: MessageId::new(format!("m{index}")),
        author: UserId::new("u1"),
        conversation_id: ConversationId::new("c1"),
        images: vec![ImageAttachment {
            id: AttachmentId::new(format!("img-{index}")),
            url: format!("https://cdn.example/{index}.jpg"),
        }],
        videos,
    }
}

fn sorted_ids<'a>(ids: impl Iterator<Item = &'a MessageId>) -> Vec<&'a str> {
    let mut ids = ids.map(MessageId::as_str).collect::<Vec<_>>();
    ids.sort_unstable();
    ids
}
