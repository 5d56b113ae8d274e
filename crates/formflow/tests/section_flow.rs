//! Multi-step flow lifecycle: navigation, events, auto-advance and persistence.

use chrono::{Duration, TimeZone, Utc};
use formflow::prelude::*;
use formflow::section::EventCollector;
use pretty_assertions::assert_eq;

fn wizard() -> SectionFlow {
    let mut flow = SectionFlow::new();
    flow.register_section(
        Section::new("applicant", "Applicant")
            .with_order(1)
            .with_fields(["Name", "Age"]),
    );
    flow.register_section(
        Section::new("guardian", "Guardian")
            .with_order(2)
            .with_fields(["Guardian"])
            .show_when("[Age]<18")
            .required_when("[Age]<18"),
    );
    flow.register_section(
        Section::new("consent", "Consent")
            .with_order(3)
            .complete_when("[Agree]=TRUE")
            .with_auto_advance(500),
    );
    flow.register_section(Section::new("summary", "Summary").with_order(4));
    flow
}

fn fields() -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("Name".into(), FieldMeta::new("Name", "Full name", "text").required());
    map.insert("Age".into(), FieldMeta::new("Age", "Age", "number").required());
    map.insert("Guardian".into(), FieldMeta::new("Guardian", "Guardian", "text").required());
    map
}

#[test]
fn test_adult_walks_past_guardian() {
    let mut flow = wizard();
    let collector = EventCollector::new();
    flow.subscribe(collector.callback());
    let fields = fields();
    let mut data = FormData::new();

    flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap();
    assert_eq!(
        flow.navigate_next(&data, &fields, NavigateOptions::default()),
        Err(FlowError::Incomplete("applicant".into()))
    );

    data.insert("Name".into(), Value::from("Ada"));
    data.insert("Age".into(), Value::from(36));
    assert_eq!(
        flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap().as_deref(),
        Some("consent")
    );

    assert_eq!(
        collector.names(),
        vec!["sectionChanged", "validationFailed", "sectionChanged"]
    );
    assert_eq!(
        collector.events().last(),
        Some(&FlowEvent::SectionChanged {
            from: Some("applicant".into()),
            to: "consent".into()
        })
    );
}

#[test]
fn test_minor_needs_guardian() {
    let mut flow = wizard();
    let fields = fields();
    let mut data = FormData::new();
    data.insert("Name".into(), Value::from("Tim"));
    data.insert("Age".into(), Value::from(12));

    assert!(flow.is_section_required("guardian", &data, &fields));
    flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap();
    assert_eq!(
        flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap().as_deref(),
        Some("guardian")
    );
    assert!(!flow.is_section_complete("guardian", &data, &fields));

    // Correcting the age hides the guardian section and moves the user on
    data.insert("Age".into(), Value::from(40));
    flow.recalculate_flow(&data, &fields);
    assert_eq!(flow.current_section_id(), Some("consent"));

    // History now skips the hidden section
    assert_eq!(
        flow.navigate_previous(&data, &fields).unwrap().as_deref(),
        Some("applicant")
    );
}

#[test]
fn test_consent_auto_advances_to_summary() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut flow = wizard();
    let fields = fields();
    let mut data = FormData::new();
    data.insert("Name".into(), Value::from("Ada"));
    data.insert("Age".into(), Value::from(36));

    flow.navigate_to_section("consent", &data, &fields).unwrap();
    data.insert("Agree".into(), Value::Boolean(true));
    flow.recalculate_flow_at(start, &data, &fields);

    let pending = flow.pending_auto_advance().cloned().unwrap();
    assert_eq!(pending.section_id, "consent");
    assert_eq!(pending.due, start + Duration::milliseconds(500));

    // A second recalculation keeps the original deadline
    flow.recalculate_flow_at(start + Duration::milliseconds(300), &data, &fields);
    assert_eq!(flow.pending_auto_advance().map(|p| p.due), Some(pending.due));

    assert_eq!(
        flow.poll_auto_advance_at(pending.due, &data, &fields).unwrap().as_deref(),
        Some("summary")
    );
    assert!(flow.pending_auto_advance().is_none());
    assert!(flow.state().completed_section_ids.contains("consent"));
}

#[test]
fn test_completing_the_form() {
    let mut flow = wizard();
    let collector = EventCollector::new();
    flow.subscribe(collector.callback());
    let fields = fields();
    let mut data = FormData::new();
    data.insert("Name".into(), Value::from("Ada"));
    data.insert("Age".into(), Value::from(36));
    data.insert("Agree".into(), Value::Boolean(true));

    for _ in 0..3 {
        flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap();
    }
    assert_eq!(flow.current_section_id(), Some("summary"));
    assert_eq!(flow.navigate_next(&data, &fields, NavigateOptions::default()), Ok(None));

    assert_eq!(
        collector.events().last(),
        Some(&FlowEvent::FormCompleted {
            completed_section_ids: vec!["applicant".into(), "consent".into(), "summary".into()]
        })
    );

    let progress = flow.get_form_progress(&data, &fields);
    assert_eq!(progress.visible_sections, 3);
    assert_eq!(progress.completed_sections, 3);
    assert_eq!(progress.percent, 100.0);
}

#[test]
fn test_state_survives_a_reload() {
    let fields = fields();
    let mut data = FormData::new();
    data.insert("Name".into(), Value::from("Ada"));
    data.insert("Age".into(), Value::from(36));

    let mut flow = wizard();
    flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap();
    flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap();
    let saved = flow.export_state_json().unwrap();

    let mut reloaded = wizard();
    reloaded.import_state_json(&saved).unwrap();
    assert_eq!(reloaded.current_section_id(), Some("consent"));
    assert_eq!(
        reloaded.navigate_previous(&data, &fields).unwrap().as_deref(),
        Some("applicant")
    );
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let mut flow = wizard();
    let collector = EventCollector::new();
    flow.subscribe(Box::new(|_: FlowEvent| panic!("listener failure")));
    let id = flow.subscribe(collector.callback());

    flow.navigate_next(&FormData::new(), &fields(), NavigateOptions::default()).unwrap();
    assert_eq!(collector.len(), 1);

    assert!(flow.unsubscribe(id));
    assert!(!flow.unsubscribe(id));
    assert_eq!(flow.listener_count(), 1);
}
