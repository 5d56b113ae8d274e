//! End-to-end behaviour of a form: formulas, calculations, validation and sections.

use formflow::prelude::*;
use pretty_assertions::assert_eq;

fn form(pairs: &[(&str, Value)]) -> FormData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_and_condition() {
    let mut engine = FormulaEngine::new();
    let data = form(&[("Status", Value::from("Complete")), ("Amount", Value::from(150))]);
    assert_eq!(
        engine.evaluate(
            Some(r#"AND([Status]="Complete",[Amount]>100)"#),
            &data,
            &FieldMap::new()
        ),
        Value::Boolean(true)
    );
}

#[test]
fn test_if_branches() {
    let mut engine = FormulaEngine::new();
    let data = form(&[("Age", Value::from(16))]);
    assert_eq!(
        engine.evaluate(Some(r#"IF([Age]>=18,"adult","minor")"#), &data, &FieldMap::new()),
        Value::from("minor")
    );
}

#[test]
fn test_dependencies_in_order_of_appearance() {
    let engine = FormulaEngine::new();
    assert_eq!(
        engine.get_dependencies("OR([A]=1,[B]=2,[C]=3)"),
        vec!["A", "B", "C"]
    );
}

#[test]
fn test_currency_total() {
    let mut registry = CalculationRegistry::new();
    registry.register_calculation_field(
        "Total",
        "SUM([Qty],[Price])",
        CalculationOptions::formatted(FormatOptions::currency()),
    );
    let data = form(&[("Qty", Value::from(3)), ("Price", Value::from(10))]);
    assert_eq!(
        registry.calculate_field_value("Total", &data, &FieldMap::new()),
        "$13.00"
    );
}

#[test]
fn test_section_appears_after_recalculation() {
    let mut flow = SectionFlow::new();
    flow.register_section(Section::new("basics", "Basics").with_order(1).with_fields(["Name"]));
    flow.register_section(
        Section::new("contact", "Contact")
            .with_order(2)
            .show_when("ISNOTBLANK([Name])"),
    );
    flow.register_section(Section::new("review", "Review").with_order(3));

    let fields = FieldMap::new();
    let mut data = form(&[("Name", Value::from(""))]);

    let visible: Vec<_> = flow
        .get_visible_sections(&data, &fields)
        .iter()
        .map(|s| s.id.clone())
        .collect();
    assert_eq!(visible, vec!["basics", "review"]);

    assert_eq!(
        flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap().as_deref(),
        Some("basics")
    );

    data.insert("Name".into(), Value::from("Ada"));
    flow.recalculate_flow(&data, &fields);
    assert_eq!(
        flow.navigate_next(&data, &fields, NavigateOptions::default()).unwrap().as_deref(),
        Some("contact")
    );
}

#[test]
fn test_validation_with_cross_field_rule() {
    let mut registry = CalculationRegistry::new();
    registry.register_validation_rule(
        "End",
        "[End]>=[Start]",
        "End must not be before start",
        RuleOptions::default(),
    );
    registry.register_validation_rule(
        "End",
        "[End]<=[Start]+30",
        "Range is longer than a month",
        RuleOptions {
            severity: Severity::Warning,
            priority: 5,
        },
    );

    let fields = FieldMap::new();
    let data = form(&[("Start", Value::from(10))]);

    assert!(registry
        .validate_field("End", &Value::from(20), &data, &fields)
        .is_empty());

    let violations = registry.validate_field("End", &Value::from(50), &data, &fields);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Warning);

    let violations = registry.validate_field("End", &Value::from(5), &data, &fields);
    assert_eq!(violations[0].message, "End must not be before start");

    // Changing Start re-validates End
    assert_eq!(registry.get_affected_validations("Start"), vec!["End"]);
}

#[test]
fn test_calculation_feeds_section_condition() {
    let mut registry = CalculationRegistry::new();
    registry.register_calculation_field("Subtotal", "[Qty]*[Price]", CalculationOptions::default());
    registry.register_calculation_field(
        "Discount",
        "IF([Subtotal]>100, [Subtotal]*0.1, 0)",
        CalculationOptions::formatted(FormatOptions::currency()),
    );

    let mut flow = SectionFlow::new();
    flow.register_section(Section::new("order", "Order").with_order(1));
    flow.register_section(
        Section::new("approval", "Approval")
            .with_order(2)
            .show_when("[Discount]>0"),
    );

    let fields = FieldMap::new();
    let mut data = form(&[("Qty", Value::from(2)), ("Price", Value::from(30))]);
    registry.apply_change("Qty", &mut data, &fields);
    assert_eq!(data["Discount"], Value::Number(0.0));
    assert!(!flow.is_section_visible("approval", &data, &fields));

    data.insert("Qty".into(), Value::from(5));
    let results = registry.apply_change("Qty", &mut data, &fields);
    let displays: Vec<_> = results.iter().map(|r| (r.field_id.as_str(), r.display.as_str())).collect();
    assert_eq!(displays, vec![("Subtotal", "150"), ("Discount", "$15.00")]);
    assert!(flow.is_section_visible("approval", &data, &fields));
}

#[test]
fn test_registry_configuration_round_trip() {
    let mut registry = CalculationRegistry::new();
    registry.register_calculation_field(
        "Total",
        "SUM([Qty],[Price])",
        CalculationOptions::formatted(FormatOptions::currency()),
    );
    registry.register_validation_rule("Qty", "[Qty]>0", "Quantity required", RuleOptions::default());

    let json = registry.export_json().unwrap();
    let mut restored = CalculationRegistry::new();
    restored.import_json(&json).unwrap();

    assert_eq!(restored.export_configuration(), registry.export_configuration());
    assert_eq!(restored.get_affected_fields("Price"), vec!["Total"]);
    assert_eq!(restored.validation_rules("Qty").len(), 1);
}
