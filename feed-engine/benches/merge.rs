use chrono::Utc;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use feed_engine::Settings;
use feed_engine::config::handlers::register_handlers;
use feed_engine_pipeline::aggregator::apply_instruction;
use feed_engine_pipeline::processor::{EventPlan, ProcessEvents};
use feed_engine_shared::types::{Aggregate, EntityType, Event, NewEvent};
use serde_json::json;
use uuid::Uuid;

const STATUSES: [&str; 4] = ["owned", "playing", "beaten", "wishlist"];

/// Game-status events for a single user, as a busy profile would emit them.
fn make_events(owner: Uuid, count: usize) -> Vec<Event> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let new = NewEvent::addition(EntityType::Game, Uuid::new_v4())
                .with_actor(owner)
                .with_extra(json!({ "status": STATUSES[i % STATUSES.len()] }));
            Event::from_new(i as i64 + 1, &new, now)
        })
        .collect()
}

fn classify_all(events: &[Event]) -> Vec<EventPlan> {
    let processor = register_handlers(&Settings::default());
    events
        .iter()
        .filter_map(|event| processor.classify(event).ok().flatten())
        .collect()
}

/// Benchmark classifying a single game-status event
fn single_event_classification(c: &mut Criterion) {
    let processor = register_handlers(&Settings::default());
    let owner = Uuid::new_v4();

    c.bench_function("classify_single_event", |b| {
        b.iter_batched(
            || make_events(owner, 1).remove(0),
            |event| processor.classify(black_box(&event)),
            BatchSize::SmallInput,
        )
    });
}

/// Benchmark merging plans into one growing aggregate
fn merge_into_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_into_aggregate");

    for size in [10, 100, 1000].iter() {
        let owner = Uuid::new_v4();
        let plans = classify_all(&make_events(owner, *size));
        let key = plans[0].merges[0].key.clone();

        group.bench_with_input(format!("events_{}", size), &plans, |b, plans| {
            b.iter_batched(
                || Aggregate::new(&key, 0, 1, Utc::now()),
                |mut aggregate| {
                    for plan in plans {
                        for instruction in &plan.merges {
                            let _ = apply_instruction(&mut aggregate, black_box(instruction));
                        }
                    }
                    aggregate
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, single_event_classification, merge_into_aggregate);
criterion_main!(benches);
