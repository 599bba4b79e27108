#![cfg(feature = "engine-sim")]

mod support;

use support::{request, sim_gateway};
use vidmill::decode::{CodecKind, OptionKind};
use vidmill::{ConversionResult, EngineVariant};

#[tokio::test]
async fn convert_end_to_end_produces_output_and_metric() {
    let gateway = sim_gateway();

    match gateway.convert(request("clip.mp4")).await.expect("convert") {
        ConversionResult::Completed { output, metric } => {
            assert!(!output.is_empty(), "sim output includes a container header");
            assert_eq!(metric.input_size, 10);
            assert_eq!(metric.output_size, output.len() as u64);
            assert_eq!(metric.format, "matroska");
            assert_eq!(metric.video_codec, "mpeg4");
            assert_eq!(metric.variant, EngineVariant::Native);
            assert_eq!(metric.job_index, 0);
        }
        ConversionResult::Failed { reason } => panic!("conversion failed: {}", reason),
    }

    // Same filename and variant: the next completed job indexes 1.
    match gateway.convert(request("clip.mp4")).await.expect("convert") {
        ConversionResult::Completed { metric, .. } => assert_eq!(metric.job_index, 1),
        ConversionResult::Failed { reason } => panic!("conversion failed: {}", reason),
    }

    let metrics = gateway.metrics().await;
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].job_index, 0);
    assert_eq!(metrics[1].job_index, 1);
}

#[tokio::test]
async fn failed_job_leaves_the_engine_usable() {
    let gateway = sim_gateway();

    let mut bad = request("clip.mp4");
    bad.video_encoder = "not-a-codec".to_string();
    match gateway.convert(bad).await.expect("convert") {
        ConversionResult::Failed { reason } => {
            assert!(reason.contains("Unknown encoder"), "reason: {}", reason)
        }
        ConversionResult::Completed { .. } => panic!("bogus encoder should fail"),
    }
    assert!(gateway.metrics().await.is_empty(), "failed jobs record nothing");

    // Fresh staging on the same instance must still work.
    match gateway.convert(request("clip.mp4")).await.expect("convert") {
        ConversionResult::Completed { metric, .. } => assert_eq!(metric.job_index, 0),
        ConversionResult::Failed { reason } => panic!("engine left broken: {}", reason),
    }
}

#[tokio::test]
async fn extra_options_pass_through_without_breaking_the_argv() {
    let gateway = sim_gateway();
    let mut req = request("clip.mp4");
    req.verbose = true;
    req.extra_options = vec!["-b:v".into(), "1M".into()];
    match gateway.convert(req).await.expect("convert") {
        ConversionResult::Completed { output, .. } => assert!(!output.is_empty()),
        ConversionResult::Failed { reason } => panic!("conversion failed: {}", reason),
    }
}

#[tokio::test]
async fn listings_decode_from_a_live_engine() {
    let gateway = sim_gateway();

    let encoders = gateway.list_encoders().await.expect("encoders");
    assert_eq!(encoders.len(), 5, "six raw entries, one duplicate id");
    let mpeg4 = &encoders[0];
    assert_eq!(mpeg4.id, 12);
    assert_eq!(mpeg4.name, "mpeg4", "first occurrence of the duplicate id wins");
    assert_eq!(mpeg4.kind, CodecKind::Video);
    assert!(mpeg4.capabilities.dr1);
    assert!(mpeg4.capabilities.delay);
    assert!(!mpeg4.capabilities.truncated);
    assert_eq!(mpeg4.options.len(), 2);
    assert_eq!(mpeg4.options[0].name, "mpeg_quant");
    assert_eq!(mpeg4.options[0].kind, OptionKind::Int);

    let aac = encoders.iter().find(|c| c.name == "aac").expect("aac listed");
    assert_eq!(aac.kind, CodecKind::Audio);
    assert!(aac.capabilities.small_last_frame);

    let options = gateway.list_codec_options(27).await.expect("options");
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].name, "crf");
    assert_eq!(options[0].kind, OptionKind::Float);
    assert!(options[0].flags.encoding_param);
    assert!(options[0].flags.video_param);
    assert!(!options[0].flags.audio_param);

    let muxers = gateway.list_muxers().await.expect("muxers");
    let matroska = muxers.iter().find(|m| m.name == "matroska").expect("matroska");
    assert_eq!(matroska.extensions, vec!["mkv"]);
    assert_eq!(matroska.default_video_codec_id, Some(27));
    let mp4 = muxers.iter().find(|m| m.name == "mp4").expect("mp4");
    assert_eq!(mp4.extensions, vec!["mp4", "m4a", "3gp"]);
    let null = muxers.iter().find(|m| m.name == "null").expect("null");
    assert!(null.extensions.is_empty());
    assert_eq!(null.default_video_codec_id, None);
    assert_eq!(null.default_audio_codec_id, None);
}

#[tokio::test]
async fn variants_boot_independent_engine_instances() {
    let gateway = sim_gateway();

    let native = gateway.convert(request("clip.mp4")).await.expect("native");
    assert!(matches!(native, ConversionResult::Completed { .. }));

    let mut portable = request("clip.mp4");
    portable.variant = EngineVariant::Portable;
    match gateway.convert(portable).await.expect("portable") {
        ConversionResult::Completed { metric, .. } => {
            assert_eq!(metric.variant, EngineVariant::Portable);
            assert_eq!(metric.job_index, 0, "indices count per variant");
        }
        ConversionResult::Failed { reason } => panic!("portable failed: {}", reason),
    }
}
