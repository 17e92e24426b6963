use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vertex_bridge::config::{
    EnsureFirstMode, MergeConfig, SystemPlacement, TurnConsolidation,
};
use vertex_bridge::merge::merge;
use vertex_bridge::normalize::RequestNormalizer;
use vertex_bridge::protocol::anthropic::{
    ContentDelta, MessageDeltaBody, MessageDeltaUsage, MessageStartBody, MessageStreamEvent,
    MessagesUsage,
};
use vertex_bridge::protocol::openai::{ChatCompletionRequest, ChatMessage, ChatRole};
use vertex_bridge::transcode::{sse_data_frame, StreamTranscoder};

fn sample_conversation(turns: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(
        ChatRole::System,
        "You are a helpful assistant that answers concisely.",
    )];
    for idx in 0..turns {
        messages.push(ChatMessage::new(
            ChatRole::User,
            format!("question {idx}: what does iterator adapter number {idx} do?"),
        ));
        messages.push(ChatMessage::new(
            ChatRole::Assistant,
            format!("answer {idx}: it lazily transforms each item of the source."),
        ));
    }
    messages
}

fn sample_request(turns: usize) -> ChatCompletionRequest {
    ChatCompletionRequest {
        messages: sample_conversation(turns),
        model: "claude-3-5-sonnet-v2@20241022".to_string(),
        max_tokens: Some(256),
        temperature: Some(0.5),
        top_p: None,
        stop: None,
        stream: Some(false),
        n: None,
        presence_penalty: None,
        frequency_penalty: None,
        extra: serde_json::Map::new(),
    }
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let messages = sample_conversation(16);

    let passthrough = MergeConfig::default();
    group.bench_function("merge_top_user_16_turns", |b| {
        b.iter(|| merge(black_box(&messages), black_box(&passthrough)));
    });

    let consolidating = MergeConfig {
        system_placement: SystemPlacement::MergeAll,
        turn_consolidation: TurnConsolidation::All,
        ..MergeConfig::default()
    };
    group.bench_function("consolidate_all_16_turns", |b| {
        b.iter(|| merge(black_box(&messages), black_box(&consolidating)));
    });
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let normalizer = RequestNormalizer::with_parts(MergeConfig::default(), EnsureFirstMode::Remove);
    c.bench_function("normalize_16_turns", |b| {
        b.iter(|| normalizer.normalize(black_box(sample_request(16))));
    });
}

fn bench_stream_transcode(c: &mut Criterion) {
    let events: Vec<MessageStreamEvent> = {
        let mut v = vec![MessageStreamEvent::MessageStart {
            message: MessageStartBody {
                id: "msg_bench".into(),
                model: "claude-3-5-sonnet-v2@20241022".into(),
                usage: MessagesUsage {
                    input_tokens: 128,
                    output_tokens: 0,
                },
            },
        }];
        for idx in 0..64 {
            v.push(MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta {
                    text: format!("fragment {idx} "),
                },
            });
        }
        v.push(MessageStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some("end_turn".into()),
            },
            usage: MessageDeltaUsage { output_tokens: 64 },
        });
        v.push(MessageStreamEvent::MessageStop {});
        v
    };

    c.bench_function("stream_transcode_64_deltas", |b| {
        b.iter(|| {
            let mut transcoder =
                StreamTranscoder::new("claude-3-5-sonnet-v2@20241022", 1_700_000_000, "fp-bench");
            let mut frames = 0usize;
            for event in &events {
                if let Some(chunk) = transcoder.on_event(black_box(event)) {
                    let frame = sse_data_frame(&chunk).unwrap();
                    frames += frame.len();
                }
            }
            frames
        });
    });
}

criterion_group!(benches, bench_merge, bench_normalize, bench_stream_transcode);
criterion_main!(benches);
