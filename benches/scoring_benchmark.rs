use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scaniq_research::evidence::queries::derive_queries;
use scaniq_research::research::citations::CitationMapper;
use scaniq_research::research::scorer;
use scaniq_research::research::state::{
    PendingFinding, Priority, ResearchQuestion, ResearchState, ResearchUpdate,
};
use scaniq_research::research::synthesis::build_sections;
use scaniq_research::{Category, InvestmentThesis, ResearchGoal};

/// A run with 40 questions and three findings each
fn populated_state() -> ResearchState {
    let goal = ResearchGoal::new("Acme", "acme.io").with_thesis(InvestmentThesis::BuyAndBuild);
    let mut state = ResearchState::new("bench", goal);

    let priorities = [Priority::Critical, Priority::High, Priority::Medium, Priority::Low];
    for i in 0..40 {
        state.questions.push(ResearchQuestion::new(
            format!("Q{:03}", i + 1),
            format!("How does subsystem {} handle load and failover?", i),
            Category::ALL[i % 4],
            priorities[(i / 4) % 4],
            1.0 / (1 + i % 5) as f64,
        ));
    }

    let updates = state
        .questions
        .iter()
        .map(|q| {
            (0..3).fold(ResearchUpdate::for_question(q.id.clone()), |update, n| {
                update.with_finding(PendingFinding {
                    question_id: q.id.clone(),
                    content: format!("Subsystem evidence {} for {}. More detail follows.", n, q.id),
                    source: format!("https://evidence.example/{}/{}", q.id, n),
                    confidence: 0.5 + 0.1 * n as f64,
                    query: format!("acme {} {}", q.id, n),
                })
            })
        })
        .collect();

    scorer::rescore(&state.apply_update(ResearchUpdate::merge(updates)))
}

fn bench_scoring(c: &mut Criterion) {
    let state = populated_state();

    c.bench_function("rescore_40_questions", |b| {
        b.iter(|| scorer::rescore(black_box(&state)))
    });

    c.bench_function("scorecard_40_questions", |b| {
        b.iter(|| scorer::scorecard(black_box(&state)))
    });
}

fn bench_citations(c: &mut Criterion) {
    let state = populated_state();
    let card = scorer::scorecard(&state);
    let sections = build_sections(&state, &card);

    c.bench_function("citation_map_120_findings", |b| {
        b.iter(|| CitationMapper::map(black_box(&sections)))
    });
}

fn bench_queries(c: &mut Criterion) {
    let state = populated_state();
    let question = &state.questions[0];

    c.bench_function("derive_queries_with_history", |b| {
        b.iter(|| derive_queries(black_box(question), &state.goal, &state.query_history))
    });
}

criterion_group!(benches, bench_scoring, bench_citations, bench_queries);
criterion_main!(benches);
