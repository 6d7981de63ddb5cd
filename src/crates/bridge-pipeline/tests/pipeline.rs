//! End-to-end pipeline tests: goal in, committed state and feedback out.

use async_trait::async_trait;
use bridge_core::{Op, StateMirror};
use bridge_pipeline::auditor::Auditor;
use bridge_pipeline::committer::Committer;
use bridge_pipeline::executor::Executor;
use bridge_pipeline::planner::Planner;
use bridge_pipeline::tools::{ExternalReader, ToolRegistry};
use bridge_pipeline::{
    ChatChannel, ExecutionTracer, Goal, MaxPerTick, PendingActions, QueueSet, Scheduler,
    SchedulerConfig, TaskSpec,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct NoExternal;

#[async_trait]
impl ExternalReader for NoExternal {
    async fn sparql_query(&self, _endpoint: &str, _query: &str) -> Result<Value, String> {
        Err("offline".to_string())
    }

    async fn semantic_search(&self, _query: &str, _limit: usize) -> Result<Value, String> {
        Err("offline".to_string())
    }
}

struct Pipeline {
    queues: QueueSet,
    mirror: StateMirror,
    chat: Arc<ChatChannel>,
    tracer: Arc<ExecutionTracer>,
    pending: Arc<PendingActions>,
    scheduler: Scheduler,
    config: SchedulerConfig,
}

impl Pipeline {
    fn new() -> Self {
        let queues = QueueSet::new();
        let mirror = StateMirror::new();
        let chat = Arc::new(ChatChannel::new());
        let tracer = Arc::new(ExecutionTracer::new());
        let pending = Arc::new(PendingActions::new());
        let registry = Arc::new(ToolRegistry::with_builtin_tools());

        let scheduler = Scheduler::new(
            queues.clone(),
            Arc::new(Planner::new(queues.clone(), tracer.clone())),
            Arc::new(Executor::new(
                queues.clone(),
                mirror.clone(),
                registry,
                Arc::new(NoExternal),
                chat.clone(),
                tracer.clone(),
            )),
            Arc::new(Auditor::new(queues.clone(), mirror.clone(), tracer.clone())),
            Arc::new(Committer::new(
                queues.clone(),
                mirror.clone(),
                pending.clone(),
                chat.clone(),
                tracer.clone(),
            )),
        );

        Self {
            queues,
            mirror,
            chat,
            tracer,
            pending,
            scheduler,
            config: SchedulerConfig::default(),
        }
    }

    async fn drain(&self, max_ticks: usize) {
        for _ in 0..max_ticks {
            self.scheduler.tick(&self.config).await;
            if self.queues.goals.is_empty()
                && self.queues.tasks.is_empty()
                && self.queues.patches.is_empty()
                && self.queues.reviews.is_empty()
            {
                break;
            }
        }
    }

    fn submit(&self, thread: &str, cid: &str, tool: &str, args: Value) {
        let goal = Goal::new(
            thread,
            cid,
            vec![TaskSpec {
                tool: tool.to_string(),
                args,
            }],
        );
        self.queues.goals.enqueue(goal, Some(thread.to_string()));
    }
}

#[tokio::test]
async fn test_create_populated_graph_commits_atomically() {
    let pipeline = Pipeline::new();
    pipeline.submit(
        "thread-A",
        "cid-1",
        "create_populated_graph",
        json!({
            "name": "Cities",
            "nodes": ["Paris", "Lyon", "Nice"],
            "edges": [
                {"source": "Paris", "destination": "Lyon", "name": "rail", "direction": "unidirectional"},
                {"source": "Lyon", "destination": "Nice", "name": "rail", "direction": "unidirectional"}
            ]
        }),
    );

    pipeline.drain(10).await;

    // One batch for the UI carrying the whole patch.
    let batches = pipeline.pending.poll();
    assert_eq!(batches.len(), 1);
    let kinds: Vec<&str> = batches[0].ops.iter().map(Op::kind).collect();
    assert_eq!(kinds[0], "createNewGraph");
    assert_eq!(kinds.iter().filter(|k| **k == "addNodePrototype").count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == "addNodeInstance").count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == "addEdge").count(), 2);

    // Committed graph: 3 instances, 2 edges, positions near the origin.
    pipeline.mirror.read(|state| {
        assert_eq!(state.graphs.len(), 1);
        let graph = state.graphs.values().next().unwrap();
        assert_eq!(graph.name, "Cities");
        assert_eq!(graph.instances.len(), 3);
        assert_eq!(graph.edge_ids.len(), 2);
        for instance in graph.instances.values() {
            assert!(instance.x.abs() <= 1000.0);
            assert!(instance.y.abs() <= 1000.0);
        }
        for edge_id in &graph.edge_ids {
            let edge = &state.edges[edge_id];
            assert_eq!(edge.arrows_toward.len(), 1);
            assert!(edge.arrows_toward.contains(&edge.destination_id));
        }
    });
}

#[tokio::test]
async fn test_dedup_against_existing_prototype_reuses_id() {
    let pipeline = Pipeline::new();
    let paris = bridge_core::NodePrototype::new("Paris");
    let paris_id = paris.id.clone();
    pipeline
        .mirror
        .local_apply(&[
            Op::CreateNewGraph {
                graph_id: "g1".to_string(),
                name: "Map".to_string(),
                description: String::new(),
                color: None,
            },
            Op::AddNodePrototype { prototype: paris },
        ])
        .unwrap();

    pipeline.submit(
        "thread-A",
        "cid-1",
        "create_subgraph",
        json!({"graph_id": "g1", "nodes": ["PARIS"]}),
    );
    pipeline.drain(10).await;

    pipeline.mirror.read(|state| {
        assert_eq!(state.prototypes.len(), 1, "no duplicate prototype");
        let graph = &state.graphs["g1"];
        assert_eq!(graph.instances.len(), 1);
        assert_eq!(
            graph.instances.values().next().unwrap().prototype_id,
            paris_id
        );
    });
}

#[tokio::test]
async fn test_validation_error_feedback_loop() {
    let pipeline = Pipeline::new();
    pipeline.submit(
        "thread-A",
        "cid-err",
        "delete_graph",
        json!({"graph_id": "does-not-exist"}),
    );
    pipeline.drain(10).await;

    // Task dropped; nothing committed.
    assert!(pipeline.queues.tasks.is_empty());
    assert!(pipeline.pending.is_empty());

    // Exactly one chat entry naming the tool and the id.
    let entries = pipeline.chat.entries_for("cid-err");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].text.contains("delete_graph"));
    assert!(entries[0].text.contains("does-not-exist"));

    // Executor metrics carry the last error.
    let metrics = pipeline.scheduler.metrics();
    assert!(metrics.last_error["executor"].contains("not found"));
}

#[tokio::test]
async fn test_partition_fairness_across_threads() {
    let pipeline = Pipeline::new();
    // Five tasks over three threads, executor budget three per tick.
    for (thread, name) in [
        ("A", "GraphA1"),
        ("A", "GraphA2"),
        ("A", "GraphA3"),
        ("B", "GraphB1"),
        ("C", "GraphC1"),
    ] {
        let goal = Goal::new(
            thread,
            &format!("cid-{}", name),
            vec![TaskSpec {
                tool: "create_graph".to_string(),
                args: json!({"name": name}),
            }],
        );
        pipeline.queues.goals.enqueue(goal, Some(thread.to_string()));
    }

    let config = SchedulerConfig {
        max_per_tick: MaxPerTick {
            planner: 5,
            executor: 3,
            auditor: 0,
            committer: 0,
        },
        auditor: false,
        committer: false,
        ..Default::default()
    };
    pipeline.scheduler.tick(&config).await;

    // One task from each thread ran; the remaining two A tasks wait.
    assert_eq!(pipeline.queues.patches.len(), 3);
    let remaining = pipeline.queues.tasks.len();
    assert_eq!(remaining, 2);
    let names: Vec<String> = pipeline
        .queues
        .patches
        .pull(3)
        .iter()
        .map(|r| r.payload.thread_id.clone())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_executor_budget_bounds_runs_per_tick() {
    let pipeline = Pipeline::new();
    for i in 0..6 {
        pipeline.submit(
            &format!("thread-{}", i),
            &format!("cid-{}", i),
            "create_graph",
            json!({"name": format!("G{}", i)}),
        );
    }

    let config = SchedulerConfig {
        max_per_tick: MaxPerTick {
            planner: 6,
            executor: 2,
            auditor: 0,
            committer: 0,
        },
        auditor: false,
        committer: false,
        ..Default::default()
    };
    pipeline.scheduler.tick(&config).await;

    let metrics = pipeline.scheduler.metrics();
    assert_eq!(metrics.runs["executor"], 2);
}

#[tokio::test]
async fn test_read_graph_structure_round_trip_has_no_coordinates() {
    let pipeline = Pipeline::new();
    let proto = bridge_core::NodePrototype::new("City");
    let mut setup = vec![
        Op::CreateNewGraph {
            graph_id: "g1".to_string(),
            name: "Cities".to_string(),
            description: String::new(),
            color: None,
        },
        Op::AddNodePrototype {
            prototype: proto.clone(),
        },
    ];
    for i in 0..5 {
        setup.push(Op::AddNodeInstance {
            graph_id: "g1".to_string(),
            instance: bridge_core::NodeInstance::new("g1", &proto.id, i as f64 * 50.0, 10.0),
        });
    }
    pipeline.mirror.local_apply(&setup).unwrap();

    pipeline.submit(
        "thread-A",
        "cid-read",
        "read_graph_structure",
        json!({"graph_id": "g1"}),
    );
    pipeline.drain(10).await;

    let entries = pipeline.chat.entries_for("cid-read");
    assert_eq!(entries.len(), 1);
    let payload = entries[0].payload.as_ref().unwrap();
    let nodes = payload["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 5);
    for node in nodes {
        assert!(node.get("id").is_some());
        assert!(node.get("prototypeId").is_some());
        assert!(node.get("name").is_some());
        assert!(node.get("x").is_none());
        assert!(node.get("y").is_none());
    }

    // Read responses never produce UI action batches.
    assert!(pipeline.pending.is_empty());
}

#[tokio::test]
async fn test_delete_graph_clears_active_pointer_only_for_itself() {
    let pipeline = Pipeline::new();
    pipeline
        .mirror
        .local_apply(&[
            Op::CreateNewGraph {
                graph_id: "keep".to_string(),
                name: "Keep".to_string(),
                description: String::new(),
                color: None,
            },
            Op::CreateNewGraph {
                graph_id: "drop".to_string(),
                name: "Drop".to_string(),
                description: String::new(),
                color: None,
            },
            Op::SetActiveGraph {
                graph_id: "keep".to_string(),
            },
        ])
        .unwrap();

    pipeline.submit("thread-A", "cid-1", "delete_graph", json!({"graph_id": "drop"}));
    pipeline.drain(10).await;

    pipeline.mirror.read(|state| {
        assert!(!state.graphs.contains_key("drop"));
        assert_eq!(state.active_graph_id.as_deref(), Some("keep"));
    });
}

#[tokio::test]
async fn test_new_graph_placeholder_resolves_through_full_pipeline() {
    let pipeline = Pipeline::new();
    pipeline.submit(
        "thread-A",
        "cid-1",
        "create_subgraph_in_new_graph",
        json!({"name": "Rivers", "nodes": ["Rhone", "Saone"], "edges": [
            {"source": "Rhone", "destination": "Saone", "name": "joins"}
        ]}),
    );
    pipeline.drain(10).await;

    pipeline.mirror.read(|state| {
        assert_eq!(state.graphs.len(), 1);
        let graph = state.graphs.values().next().unwrap();
        assert_eq!(graph.name, "Rivers");
        assert!(!graph.id.starts_with("NEW_GRAPH:"));
        assert_eq!(graph.instances.len(), 2);
        assert_eq!(graph.edge_ids.len(), 1);
        for instance in graph.instances.values() {
            assert_eq!(instance.graph_id, graph.id);
        }
    });

    let batches = pipeline.pending.poll();
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].graph_id.starts_with("NEW_GRAPH:"));
}

#[tokio::test]
async fn test_fuzzy_dedup_leaves_one_trace_record() {
    let pipeline = Pipeline::new();
    pipeline
        .mirror
        .local_apply(&[
            Op::CreateNewGraph {
                graph_id: "g1".to_string(),
                name: "Grid".to_string(),
                description: String::new(),
                color: None,
            },
            Op::AddNodePrototype {
                prototype: bridge_core::NodePrototype::new("Electricity"),
            },
        ])
        .unwrap();

    pipeline.submit(
        "thread-A",
        "cid-fuzz",
        "create_subgraph",
        json!({"graph_id": "g1", "nodes": ["Electrycity"]}),
    );
    pipeline.drain(10).await;

    let fuzzy = pipeline.tracer.spans_for_stage("cid-fuzz", "fuzzy-dedup");
    assert_eq!(fuzzy.len(), 1);
    assert!(fuzzy[0].detail.as_ref().unwrap().contains("Electricity"));

    pipeline.mirror.read(|state| {
        assert_eq!(state.prototypes.len(), 1);
    });
}
