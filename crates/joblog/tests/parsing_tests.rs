//! Table-driven tests for template parsing.
//!
//! Covers the required-field and confidence laws, quantity capture and the
//! normalization the parser applies to both sides.

mod common;

use common::{client_quantity_template, TemplateBuilder};
use joblog::model::{EntityType, RecordStatus};
use joblog::parser::ParsingEngine;

/// Expected item as (label, value, confidence, position).
type Item = (&'static str, &'static str, f64, usize);

struct ParseTestCase {
    name: &'static str,
    input: &'static str,
    expected_items: &'static [Item],
    expected_status: RecordStatus,
    expected_missing: &'static [&'static str],
}

const CLIENT_QUANTITY_TESTS: &[ParseTestCase] = &[
    ParseTestCase {
        name: "required_and_optional_found",
        input: "trabajo para cliente: Juan cantidad: 5",
        expected_items: &[("Cliente", "cliente", 1.0, 13), ("Cantidad", "5", 1.0, 27)],
        expected_status: RecordStatus::Verified,
        expected_missing: &[],
    },
    ParseTestCase {
        name: "required_missing",
        input: "trabajo para Pedro",
        expected_items: &[],
        expected_status: RecordStatus::NeedsReview,
        expected_missing: &["Cliente"],
    },
    ParseTestCase {
        name: "optional_missing_still_verified",
        input: "Cliente Juan",
        expected_items: &[("Cliente", "cliente", 1.0, 0)],
        expected_status: RecordStatus::Verified,
        expected_missing: &[],
    },
    ParseTestCase {
        name: "quantity_without_number_is_ignored",
        input: "cliente Ana, cantidad pendiente",
        expected_items: &[("Cliente", "cliente", 1.0, 0)],
        expected_status: RecordStatus::Verified,
        expected_missing: &[],
    },
    ParseTestCase {
        name: "quantity_decimal_comma_and_equals",
        input: "cantidad=2,5 para cliente",
        expected_items: &[("Cliente", "cliente", 1.0, 18), ("Cantidad", "2,5", 1.0, 0)],
        expected_status: RecordStatus::Verified,
        expected_missing: &[],
    },
    ParseTestCase {
        name: "accents_and_case_ignored",
        input: "CLIÉNTE Marta",
        expected_items: &[("Cliente", "cliente", 1.0, 0)],
        expected_status: RecordStatus::Verified,
        expected_missing: &[],
    },
    ParseTestCase {
        name: "word_boundary_required",
        input: "clientela grande",
        expected_items: &[],
        expected_status: RecordStatus::NeedsReview,
        expected_missing: &["Cliente"],
    },
    ParseTestCase {
        name: "blank_input_is_unstructured",
        input: "   ",
        expected_items: &[],
        expected_status: RecordStatus::Unstructured,
        expected_missing: &[],
    },
];

#[test]
fn test_client_quantity_parsing() {
    let engine = ParsingEngine::new();
    let template = client_quantity_template();

    for test_case in CLIENT_QUANTITY_TESTS {
        let outcome = engine.parse(test_case.input, &template).unwrap();

        let items: Vec<(String, String, f64, usize)> = outcome
            .items
            .iter()
            .map(|i| {
                (
                    i.entity_label().to_string(),
                    i.value().to_string(),
                    i.confidence(),
                    i.position(),
                )
            })
            .collect();
        let expected: Vec<(String, String, f64, usize)> = test_case
            .expected_items
            .iter()
            .map(|(l, v, c, p)| (l.to_string(), v.to_string(), *c, *p))
            .collect();

        assert_eq!(items, expected, "Test '{}': items", test_case.name);
        assert_eq!(
            outcome.status, test_case.expected_status,
            "Test '{}': status",
            test_case.name
        );
        assert_eq!(
            outcome.missing_required, test_case.expected_missing,
            "Test '{}': missing",
            test_case.name
        );
    }
}

#[test]
fn test_synonyms_score_lower_than_keywords() {
    let engine = ParsingEngine::new();
    let template = TemplateBuilder::new("Vivero")
        .entity("Producto", EntityType::Product, &["planta"], &["esqueje"], true)
        .build();

    let by_synonym = engine.parse("tres esquejes y un esqueje", &template).unwrap();
    assert_eq!(by_synonym.items.len(), 1);
    assert_eq!(by_synonym.items[0].value(), "esqueje");
    assert_eq!(by_synonym.items[0].confidence(), 0.9);
    assert_eq!(by_synonym.items[0].position(), 19);

    let by_keyword = engine.parse("esqueje y planta", &template).unwrap();
    assert_eq!(by_keyword.items[0].value(), "planta");
    assert_eq!(by_keyword.items[0].confidence(), 1.0);
}

#[test]
fn test_every_confidence_is_in_range() {
    let engine = ParsingEngine::new();
    let template = TemplateBuilder::new("Completo")
        .entity("Cliente", EntityType::Client, &["cliente"], &["señor"], true)
        .entity("Calibre", EntityType::Caliber, &["calibre"], &["grosor"], false)
        .entity("Lugar", EntityType::Location, &["finca"], &["parcela"], false)
        .optional("Kilos", EntityType::Quantity, &["kg"])
        .build();

    let inputs = [
        "señor Gómez, grosor fino, parcela 3, kg 40",
        "cliente y calibre en la finca kg: 12.5",
        "nada que ver",
    ];
    for input in inputs {
        let outcome = engine.parse(input, &template).unwrap();
        for item in &outcome.items {
            assert!((0.0..=1.0).contains(&item.confidence()), "{}", input);
        }
        let verified = outcome.missing_required.is_empty();
        assert_eq!(outcome.status == RecordStatus::Verified, verified, "{}", input);
    }
}

#[test]
fn test_parse_is_deterministic_across_engines() {
    let template = client_quantity_template();
    let input = "cliente: Juan cantidad: 5";
    let first = ParsingEngine::new().parse(input, &template).unwrap();
    for _ in 0..10 {
        assert_eq!(ParsingEngine::default().parse(input, &template).unwrap(), first);
    }
}
