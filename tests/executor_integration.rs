//! Script executor integration tests against the simulated battlefield

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use battle_copilot::battle::*;
use battle_copilot::core::config::EngineConfig;
use battle_copilot::core::error::CopilotError;
use battle_copilot::core::types::{GridPoint, Point};
use battle_copilot::device::{Services, UiElement};
use battle_copilot::notify::{AttemptOutcome, CopilotEvent, RecordingSink};
use battle_copilot::sim::{SimBattlefield, SimInput, SimScenario, SimScreen, SimStage, SimUnit};

const STAGE: &str = "Test";

/// 6x3 tiles, 100px apart; (0, 0) cannot be built on
fn layouts() -> LayoutStore {
    let mut tiles = Vec::new();
    for x in 0..6 {
        for y in 0..3 {
            tiles.push(TileInfo {
                loc: GridPoint::new(x, y),
                pos: Point::new(200 + x * 100, 150 + y * 100),
                buildable: if (x, y) == (0, 0) {
                    Buildable::None
                } else {
                    Buildable::Any
                },
            });
        }
    }
    let mut store = LayoutStore::new();
    store.insert(StageLayout {
        stage: STAGE.to_string(),
        tile_size: 60,
        tiles,
    });
    store
}

fn pixel(x: i32, y: i32) -> Point {
    Point::new(200 + x * 100, 150 + y * 100)
}

/// Battlefield already in battle (no start screen)
fn in_battle(stage: SimStage) -> (Arc<SimBattlefield>, Arc<RecordingSink>, Services) {
    let (sim, sink, services) = at_ready(stage);
    sim.start_battle();
    (sim, sink, services)
}

fn at_ready(stage: SimStage) -> (Arc<SimBattlefield>, Arc<RecordingSink>, Services) {
    let sim = Arc::new(SimBattlefield::new(SimScenario::single(stage)));
    let sink = Arc::new(RecordingSink::new());
    let services = sim.services(sink.clone(), EngineConfig::new().with_poll_interval_ms(0));
    (sim, sink, services)
}

fn taps_at(sim: &SimBattlefield, at: Point) -> usize {
    sim.inputs()
        .iter()
        .filter(|input| matches!(input, SimInput::Tap(p) if *p == at))
        .count()
}

fn texas(skill_ticks: u32) -> SimUnit {
    SimUnit::new("Texas", Role::Warrior, 1).with_skill_ticks(skill_ticks)
}

#[test]
fn test_group_deploy_and_skill() {
    let stage = SimStage::new(STAGE)
        .with_cost(0, 1)
        .with_unit(SimUnit::new("Texas", Role::Warrior, 5).with_skill_ticks(3))
        .with_unit(SimUnit::new("Exusiai", Role::Sniper, 3));
    let (sim, sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.groups.push(Group::new(
        "Defender",
        vec![
            GroupMember::new("Siege", SkillUsage::Manual),
            GroupMember::new("Texas", SkillUsage::Manual),
        ],
    ));
    script.actions = vec![
        Action::deploy("Defender", GridPoint::new(2, 1), DeployDirection::Left),
        Action::deploy("Exusiai", GridPoint::new(3, 1), DeployDirection::Up),
        Action::new(ActionKind::UseSkill).with_target("Defender"),
    ];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(executor.placeholders().get("Defender"), Some("Texas"));

    let report = sim.report();
    let deployed: Vec<_> = report.deployments.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(deployed, vec!["Texas", "Exusiai"]);
    assert_eq!(report.deployments[0].1, pixel(2, 1));
    assert_eq!(report.skills_used, vec!["Texas".to_string()]);

    assert_eq!(sink.actions(), vec!["Deploy", "Deploy", "UseSkill"]);
    match &sink.events()[0] {
        CopilotEvent::CopilotAction { target, .. } => assert_eq!(target, "Texas"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_bullet_time_forwards_exactly_one_step() {
    let stage = SimStage::new(STAGE).with_cost(10, 1).with_unit(texas(2));
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![
        Action::deploy("Texas", GridPoint::new(2, 1), DeployDirection::Right),
        Action::new(ActionKind::BulletTime),
        Action::new(ActionKind::UseSkill).with_target("Texas"),
        Action::new(ActionKind::Retreat).with_target("Texas"),
    ];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert!(!executor.in_bullet_time());

    let report = sim.report();
    assert_eq!(report.skills_used, vec!["Texas".to_string()]);
    assert_eq!(report.retreats, vec!["Texas".to_string()]);
    // One selection for the bullet-time skill, one for the plain retreat
    assert_eq!(taps_at(&sim, pixel(2, 1)), 2);
    assert!(executor.tracker().battlefield().is_empty());
}

#[test]
fn test_bullet_time_without_follow_up_is_rejected() {
    let (_sim, _sink, services) = in_battle(SimStage::new(STAGE));

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::BulletTime)];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    assert!(matches!(
        executor.run_attempt(),
        Err(CopilotError::InvalidAction(_))
    ));
}

#[test]
fn test_camera_pan_keeps_coordinates_valid() {
    let stage = SimStage::new(STAGE).with_cost(10, 1).with_unit(texas(1));
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    let mut pan = Action::new(ActionKind::MoveCamera);
    pan.distance = (1.0, 0.0);
    script.actions = vec![
        Action::deploy("Texas", GridPoint::new(2, 1), DeployDirection::Right),
        pan,
        Action::new(ActionKind::UseSkill).with_location(GridPoint::new(2, 1)),
    ];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(executor.tracker().camera_moves(), 1);
    assert_eq!(executor.tracker().grid().map(|g| g.shift()), Some((-60, 0)));

    let report = sim.report();
    assert_eq!(report.camera_pans, 1);
    assert_eq!(report.skills_used, vec!["Texas".to_string()]);
    assert_eq!(taps_at(&sim, pixel(2, 1).offset(-60, 0)), 1);
}

#[test]
fn test_cost_delta_waits_for_drop() {
    // Cost drains by 2 per tick
    let stage = SimStage::new(STAGE).with_cost(26, -2);
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::Output).with_conditions(WaitConditions {
        cost_changes: -10,
        ..Default::default()
    })];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(executor.tracker().cost(), sim.cost());
    assert!(sim.cost() <= 16);
    assert_eq!(sim.cost() % 2, 0);
}

#[test]
fn test_deploy_wait_ends_with_battle() {
    let stage = SimStage::new(STAGE)
        .with_cost(0, 1)
        .with_end_after_ticks(10)
        .with_unit(SimUnit::new("Giant", Role::Tank, 500));
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![
        Action::deploy("Giant", GridPoint::new(1, 1), DeployDirection::Right),
        Action::new(ActionKind::SwitchSpeed),
    ];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(sim.screen(), Some(SimScreen::Won));
    assert!(sim.report().deployments.is_empty());
    assert_eq!(sim.report().speed_toggles, 0);
}

#[test]
fn test_kills_condition_gates_next_step() {
    let stage = SimStage::new(STAGE)
        .with_cost(10, 1)
        .with_kills(10, 2)
        .with_unit(texas(0));
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![
        Action::deploy("Texas", GridPoint::new(2, 1), DeployDirection::Right),
        Action::new(ActionKind::SwitchSpeed).with_conditions(WaitConditions {
            kills: 3,
            ..Default::default()
        }),
    ];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert!(executor.tracker().kills() >= 3);
    assert_eq!(sim.report().speed_toggles, 1);
}

#[test]
fn test_unplaceable_tile_fails_step() {
    let stage = SimStage::new(STAGE).with_cost(10, 1).with_unit(texas(0));
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::deploy(
        "Texas",
        GridPoint::new(0, 0),
        DeployDirection::Right,
    )];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::StepFailed { index: 0 });
    assert!(sim.report().deployments.is_empty());
}

#[test]
fn test_unknown_layout_is_configuration_error() {
    let (_sim, sink, services) = in_battle(SimStage::new("Nowhere"));

    let script = CopilotScript::new("Nowhere");
    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);

    assert!(matches!(
        executor.run_attempt(),
        Err(CopilotError::UnknownStage(ref s)) if s == "Nowhere"
    ));
    assert!(sink.events().contains(&CopilotEvent::UnsupportedStage {
        stage: "Nowhere".into()
    }));
}

#[test]
fn test_cancel_interrupts_wait() {
    let stage = SimStage::new(STAGE)
        .with_cost(0, 1)
        .with_unit(SimUnit::new("Giant", Role::Tank, 500));
    let sim = Arc::new(SimBattlefield::new(SimScenario::single(stage)));
    sim.start_battle();
    let services = sim.services(
        Arc::new(RecordingSink::new()),
        EngineConfig::new().with_poll_interval_ms(1),
    );
    let cancel = services.cancel.clone();

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::deploy(
        "Giant",
        GridPoint::new(1, 1),
        DeployDirection::Right,
    )];

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();
    canceller.join().unwrap();

    assert_eq!(outcome, AttemptOutcome::Cancelled);
    assert_eq!(sim.screen(), Some(SimScreen::Battle));
}

#[test]
fn test_skill_daemon_fires_auto_skills_until_end() {
    let stage = SimStage::new(STAGE)
        .with_cost(10, 1)
        .with_end_after_ticks(40)
        .with_unit(texas(2));
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![
        Action::deploy("Texas", GridPoint::new(2, 1), DeployDirection::Right),
        Action::new(ActionKind::SkillUsage)
            .with_target("Texas")
            .with_usage(SkillUsage::Auto),
        Action::new(ActionKind::SkillDaemon),
    ];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(sim.screen(), Some(SimScreen::Won));
    assert!(sim.report().skills_used.len() >= 2);
}

fn autonomous_start(stage: SimStage) -> (Arc<SimBattlefield>, Arc<RecordingSink>, Services) {
    let (sim, sink, services) = at_ready(stage.with_prep_screen());
    assert!(services.click(UiElement::StartFighting, 5));
    assert_eq!(sim.screen(), Some(SimScreen::Prep));
    (sim, sink, services)
}

#[test]
fn test_autonomous_policy_fills_strategies_in_order() {
    let stage = SimStage::new(STAGE)
        .with_cost(0, 1)
        .with_kills(3, 4)
        .with_unit(SimUnit::new("T1", Role::Tank, 2))
        .with_unit(SimUnit::new("S1", Role::Sniper, 1))
        .with_unit(SimUnit::new("Boss", Role::Caster, 4));
    let (sim, _sink, services) = autonomous_start(stage);

    let strategies = vec![
        Strategy {
            core: String::new(),
            tool_men: vec![RoleQuota {
                role: Role::Tank,
                quantity: 1,
            }],
            location: GridPoint::new(1, 1),
            direction: DeployDirection::Left,
        },
        Strategy {
            core: "Boss".into(),
            tool_men: Vec::new(),
            location: GridPoint::new(4, 1),
            direction: DeployDirection::Left,
        },
    ];
    let script = CopilotScript::new(STAGE);
    let policy = AutonomousPolicy::new(strategies, &script.actions);

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    let report = sim.report();
    assert_eq!(
        report.deployments,
        vec![("T1".to_string(), pixel(1, 1)), ("Boss".to_string(), pixel(4, 1))]
    );
    assert_eq!(report.battles_won, 1);
    assert_eq!(executor.policy().strategies()[0].tool_men[0].quantity, 0);
}

#[test]
fn test_check_abort_abandons_when_unit_missing() {
    let stage = SimStage::new(STAGE).with_cost(10, 1).with_unit(texas(0));
    let (sim, sink, services) = autonomous_start(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::CheckAbort).with_target("Ghost")];
    let policy = AutonomousPolicy::new(Vec::new(), &script.actions);

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Abandoned);
    assert_eq!(sim.report().abandoned, 1);
    assert_eq!(sim.screen(), Some(SimScreen::Ready));
    assert_eq!(sink.actions(), vec!["CheckIfStartOver"]);
}

#[test]
fn test_check_abort_keeps_battle_when_roster_matches() {
    let stage = SimStage::new(STAGE)
        .with_cost(10, 1)
        .with_end_after_ticks(5)
        .with_unit(texas(0));
    let (sim, _sink, services) = autonomous_start(stage);

    let mut check = Action::new(ActionKind::CheckAbort);
    check.role_counts = vec![(Role::Warrior, 1)];
    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![check];
    let policy = AutonomousPolicy::new(Vec::new(), &script.actions);

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(sim.report().abandoned, 0);
    assert_eq!(sim.screen(), Some(SimScreen::Won));
}

#[test]
fn test_collect_drops_prefers_ordered_item() {
    let stage = SimStage::new(STAGE)
        .with_end_after_ticks(5)
        .with_drops(&["Iron", "Gold"]);
    let (sim, _sink, services) = autonomous_start(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::CollectDrops)];
    let policy = AutonomousPolicy::new(Vec::new(), &script.actions)
        .with_order_of_drops(vec!["Gold".into(), "Iron".into()]);

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(sim.report().drops_taken, vec!["Gold".to_string()]);
}

#[test]
fn test_draw_card_step_adds_unit() {
    let stage = SimStage::new(STAGE)
        .with_end_after_ticks(8)
        .with_draw_pool(vec![SimUnit::new("Extra", Role::Support, 50)]);
    let (sim, _sink, services) = autonomous_start(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::DrawCard)];
    let policy = AutonomousPolicy::new(Vec::new(), &script.actions);

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(sim.report().cards_drawn, 1);
}

#[test]
fn test_passive_policy_rejects_policy_steps() {
    let stage = SimStage::new(STAGE).with_cost(10, 1);
    let (sim, _sink, services) = in_battle(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::DrawCard)];

    let mut executor = ScriptExecutor::new(services, script, &layouts(), PassivePolicy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::StepFailed { index: 0 });
    assert_eq!(sim.report().cards_drawn, 0);
}

#[test]
fn test_group_deploy_target_is_not_used_as_tool() {
    // A is the only Medic and belongs to a group the script deploys itself
    let stage = SimStage::new(STAGE)
        .with_cost(5, 1)
        .with_kills(3, 2)
        .with_unit(SimUnit::new("A", Role::Medic, 1))
        .with_unit(SimUnit::new("T1", Role::Tank, 1));
    let (sim, _sink, services) = autonomous_start(stage);

    let mut script = CopilotScript::new(STAGE);
    script
        .groups
        .push(Group::new("healer", vec![GroupMember::new("A", SkillUsage::Manual)]));
    script.actions = vec![
        Action::deploy("healer", GridPoint::new(2, 1), DeployDirection::Left).with_conditions(
            WaitConditions {
                kills: 1,
                ..Default::default()
            },
        ),
    ];
    let quota = |role, x| Strategy {
        core: String::new(),
        tool_men: vec![RoleQuota { role, quantity: 1 }],
        location: GridPoint::new(x, 1),
        direction: DeployDirection::Left,
    };
    let policy = AutonomousPolicy::new(
        vec![quota(Role::Medic, 1), quota(Role::Tank, 3)],
        &script.actions,
    );

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert_eq!(
        sim.report().deployments,
        vec![("T1".to_string(), pixel(3, 1)), ("A".to_string(), pixel(2, 1))]
    );
    assert_eq!(executor.policy().strategies()[0].tool_men[0].quantity, 1);
}

#[test]
fn test_collect_drops_without_drops_screen_is_noop() {
    let stage = SimStage::new(STAGE).with_end_after_ticks(5);
    let (sim, _sink, services) = autonomous_start(stage);

    let mut script = CopilotScript::new(STAGE);
    script.actions = vec![Action::new(ActionKind::CollectDrops)];
    let policy = AutonomousPolicy::new(Vec::new(), &script.actions)
        .with_order_of_drops(vec!["Gold".into()]);

    let mut executor = ScriptExecutor::new(services, script, &layouts(), policy);
    let outcome = executor.run_attempt().unwrap();

    assert_eq!(outcome, AttemptOutcome::Completed);
    assert!(sim.report().drops_taken.is_empty());
    assert_eq!(sim.report().drops_dismissed, 0);
}
