mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use beatcut_core::audio::BpmEstimatorConfig;
use beatcut_core::compose::{ComposeStage, RenderStatus};
use beatcut_core::effects::AnalysisSource;
use beatcut_core::error::CoreError;
use beatcut_core::script::Vibe;
use beatcut_pipeline::audio_analyzer::AudioAnalyzer;
use beatcut_pipeline::effect_analyzer::EffectAnalyzer;
use beatcut_pipeline::image_cache::{ImageCache, ImageCacheConfig};
use beatcut_pipeline::music::MusicMatcher;
use beatcut_pipeline::script_generator::{ArtistBrief, ScriptGenerator, ScriptRequest};
use beatcut_pipeline::sourcing::ImageSourcer;
use beatcut_pipeline::{ComposeOrchestrator, ComposeRun, PipelineError};
use beatcut_render::events::RenderProgress;
use beatcut_render::messages::JobStatus;
use beatcut_render::poller::{PollConfig, RenderJobPoller};

use common::{
    job_status, png, script_reply, strings, track, CountingSearch, FakeFetcher, FakeLibrary,
    FakeRenderEngine, InMemoryCacheStore, MemoryObjectStore, ScriptedModel, SpikeProbe,
};

const QUERY: &str = "beach neon crowd";

struct Setup {
    orchestrator: ComposeOrchestrator,
    engine: Arc<FakeRenderEngine>,
    model: Arc<ScriptedModel>,
}

fn setup(statuses: Vec<JobStatus>, max_attempts: u32) -> Setup {
    // Script reply, then a failing effect call so the keyword fallback runs.
    let model = ScriptedModel::new(vec![
        Ok(script_reply(6, "Exciting", &["neon", "crowd"])),
        Err(500),
    ]);

    let fetcher = FakeFetcher::new();
    for i in 0..3 {
        fetcher.serve(&CountingSearch::url_for(QUERY, i), png(i as u32 + 1, 2));
    }
    let cache = Arc::new(ImageCache::new(
        InMemoryCacheStore::new(),
        MemoryObjectStore::new(),
        fetcher,
        ImageCacheConfig::default(),
    ));
    let images = ImageSourcer::new(cache, CountingSearch::new());

    let analyzer = AudioAnalyzer::with_probe(
        Arc::new(SpikeProbe {
            duration: 120.0,
            loud_from: 60.0,
            loud_to: 75.0,
        }),
        BpmEstimatorConfig::default(),
    );
    let music = MusicMatcher::new(
        Arc::new(FakeLibrary {
            assets: vec![
                track("ballad", Vibe::Emotional, Some(72), 200.0),
                track("anthem", Vibe::Exciting, Some(128), 120.0),
            ],
        }),
        Arc::new(analyzer),
    );

    let engine = FakeRenderEngine::new(statuses);
    let poller = RenderJobPoller::new(
        engine.clone(),
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
        },
    );

    Setup {
        orchestrator: ComposeOrchestrator::new(
            ScriptGenerator::new(model.clone()),
            EffectAnalyzer::with_model(model.clone()),
            images,
            music,
            engine.clone(),
            poller,
        ),
        engine,
        model,
    }
}

fn new_run() -> ComposeRun {
    ComposeRun::new(
        "gen-1",
        "camp-1",
        ScriptRequest {
            artist: ArtistBrief {
                name: "NOVA".into(),
                genre: "kpop".into(),
                description: None,
            },
            prompt: "explosive summer dance party".into(),
            target_duration: 15.0,
            trend_keywords: strings(&["beach"]),
            language: "en".into(),
            use_grounding: false,
        },
    )
}

fn completed(url: &str) -> JobStatus {
    JobStatus {
        output_url: Some(url.into()),
        ..job_status(RenderStatus::Completed, 100)
    }
}

#[tokio::test]
async fn full_run_renders_with_stored_images_and_offset_audio() {
    let s = setup(
        vec![
            job_status(RenderStatus::Queued, 0),
            job_status(RenderStatus::Processing, 40),
            completed("https://cdn.test/out.mp4"),
        ],
        10,
    );
    let mut run = new_run();
    let seen = Mutex::new(Vec::new());
    let on_progress = |p: &RenderProgress| seen.lock().unwrap().push(p.progress);

    s.orchestrator
        .run(&mut run, &CancellationToken::new(), Some(&on_progress))
        .await
        .unwrap();

    assert_eq!(run.job.stage, ComposeStage::Completed);
    assert_eq!(run.job.render_status, Some(RenderStatus::Completed));
    assert_eq!(run.job.output_url.as_deref(), Some("https://cdn.test/out.mp4"));
    assert_eq!(run.job.render_job_id.as_deref(), Some("render-1"));
    assert_eq!(run.job.vibe, Some(Vibe::Exciting));
    assert_eq!(run.job.audio_asset_id.as_deref(), Some("anthem"));
    assert_eq!(run.job.selected_images.len(), 3);
    assert_eq!(run.effects.as_ref().map(|e| e.source), Some(AnalysisSource::Keywords));
    assert_eq!(*seen.lock().unwrap(), vec![0, 40, 100]);
    assert_eq!(s.model.requests().len(), 2);

    let submitted = s.engine.submitted();
    assert_eq!(submitted.len(), 1);
    let spec = &submitted[0];
    assert_eq!(spec.generation_id, "gen-1");
    assert_eq!(spec.captions.len(), 6);
    assert_eq!(spec.slides.len(), 3);
    assert!(spec.slides.iter().all(|s| s.image_url.starts_with("https://cdn.test/images/")));
    let audio = spec.audio.as_ref().unwrap();
    assert_eq!(audio.url, "https://music.test/anthem.mp3");
    // Loud window at 60 s plays under the first climax line, 8 s in.
    assert!((audio.start_offset - 52.0).abs() < 1e-9);
    assert!(s.engine.cancelled().is_empty());
}

#[tokio::test]
async fn engine_failure_fails_the_job_with_its_message() {
    let s = setup(
        vec![JobStatus {
            error: Some("codec exploded".into()),
            ..job_status(RenderStatus::Failed, 10)
        }],
        10,
    );
    let mut run = new_run();

    let result = s.orchestrator.run(&mut run, &CancellationToken::new(), None).await;

    assert_matches!(result, Err(PipelineError::RenderFailed(ref msg)) if msg == "codec exploded");
    assert_eq!(run.job.stage, ComposeStage::Failed);
    assert_eq!(run.job.error.as_deref(), Some("codec exploded"));
    assert_eq!(run.job.render_status, Some(RenderStatus::Failed));
}

#[tokio::test]
async fn render_timeout_is_distinct() {
    let s = setup(vec![], 3);
    let mut run = new_run();

    let result = s.orchestrator.run(&mut run, &CancellationToken::new(), None).await;

    assert_matches!(result, Err(PipelineError::RenderTimedOut { attempts: 3 }));
    assert_eq!(run.job.stage, ComposeStage::Failed);
    assert!(run.job.error.as_deref().unwrap().starts_with("render timed out"));
}

#[tokio::test]
async fn cancelled_render_fails_the_job() {
    let s = setup(vec![], 1000);
    let mut run = new_run();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = s.orchestrator.run(&mut run, &cancel, None).await;

    assert_matches!(result, Err(PipelineError::Cancelled));
    assert_eq!(run.job.stage, ComposeStage::Failed);
    assert_eq!(s.engine.cancelled(), vec!["render-1".to_string()]);
}

#[tokio::test]
async fn failed_remote_cancel_still_cancels_the_run() {
    let s = setup(vec![], 1000);
    s.engine.set_cancel_failing(true);
    let mut run = new_run();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = s.orchestrator.run(&mut run, &cancel, None).await;

    assert_matches!(result, Err(PipelineError::Cancelled));
    assert_eq!(run.job.stage, ComposeStage::Failed);
    assert_eq!(s.engine.cancelled().len(), 1);
}

#[tokio::test]
async fn script_failure_stops_before_sourcing() {
    let s = setup(vec![], 10);
    let mut run = new_run();
    run.request.trend_keywords.clear();
    let failing = ScriptedModel::new(vec![Err(500)]);
    let orchestrator = ComposeOrchestrator::new(
        ScriptGenerator::new(failing.clone()),
        EffectAnalyzer::with_model(failing),
        ImageSourcer::new(
            Arc::new(ImageCache::new(
                InMemoryCacheStore::new(),
                MemoryObjectStore::new(),
                FakeFetcher::new(),
                ImageCacheConfig::default(),
            )),
            CountingSearch::new(),
        ),
        MusicMatcher::new(Arc::new(FakeLibrary { assets: vec![] }), Arc::new(AudioAnalyzer::default())),
        s.engine.clone(),
        RenderJobPoller::new(s.engine.clone(), PollConfig::default()),
    );

    let result = orchestrator.run(&mut run, &CancellationToken::new(), None).await;

    assert_matches!(result, Err(PipelineError::Llm(_)));
    assert_eq!(run.job.stage, ComposeStage::Failed);
    assert!(run.draft.is_none());
    assert!(s.engine.submitted().is_empty());
}

#[tokio::test]
async fn stages_can_be_rerun_before_rendering_but_not_after() {
    let s = setup(vec![completed("https://cdn.test/out.mp4")], 10);
    let mut run = new_run();
    let cancel = CancellationToken::new();

    s.orchestrator.draft(&mut run).await.unwrap();
    s.orchestrator.source_images(&mut run).await.unwrap();
    s.orchestrator.match_music(&mut run).await.unwrap();
    // Back to sourcing after matching is allowed.
    s.orchestrator.source_images(&mut run).await.unwrap();
    s.orchestrator.match_music(&mut run).await.unwrap();

    let keep = run.candidates[2].id.clone();
    run.select_images(&[keep.clone()]).unwrap();
    s.orchestrator.render(&mut run, &cancel, None).await.unwrap();
    assert_eq!(s.engine.submitted()[0].slides.len(), 1);

    let again = s.orchestrator.source_images(&mut run).await;
    assert_matches!(again, Err(PipelineError::Core(CoreError::Conflict(_))));
    assert_eq!(run.job.stage, ComposeStage::Completed);
    assert!(run.select_images(&[keep]).is_err());
}
