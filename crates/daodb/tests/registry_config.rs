use daodb::prelude::*;
use daodb::testing::{GatewayEvent, ScriptedGateway};

fn sales(config: DaoConfig) -> SchemaRegistry {
    let mut db = SchemaRegistry::with_config("sales", config.into_shared());
    db.add_table(
        TableDescriptor::new(
            "sales.Invoice inv",
            vec![
                FieldDescriptor::new("invoiceid", FieldType::IntSequence).unwrap(),
                FieldDescriptor::new("issued", FieldType::Date)
                    .unwrap()
                    .format("%d/%m/%Y")
                    .format_sql("103"),
                FieldDescriptor::new("total", FieldType::Float)
                    .unwrap()
                    .format("0.00"),
            ],
        )
        .unwrap(),
    );
    db
}

#[test]
fn config_loaded_from_json_drives_sequences() {
    let config =
        DaoConfig::from_json_str(r#"{"sequence_suffix": "_seq", "datetime_for_date": true}"#)
            .unwrap();
    let db = sales(config);

    let mut invoice = Record::from_registry(&db, "sales.invoice").unwrap();
    invoice.set_field_value("total", "12.50").unwrap();

    let mut gw = ScriptedGateway::new();
    gw.push_scalar("7");
    invoice.save(&mut gw).unwrap();
    assert_eq!(
        gw.events(),
        &[
            GatewayEvent::Scalar("select SALES.invoiceid_seq.nextval from dual".to_string()),
            GatewayEvent::Update(
                "insert into SALES.INVOICE (total) values (12.50)".to_string()
            ),
        ]
    );
    assert_eq!(invoice.value("invoiceid").unwrap(), Some("7"));

    assert_eq!(
        db.create_all_sql(),
        vec![
            "create table SALES.INVOICE (invoiceid int, issued datetime, total float)".to_string(),
            "create sequence SALES.invoiceid_seq".to_string(),
        ]
    );
}

#[test]
fn unqualified_lookup_depends_on_strictness() {
    let lenient = sales(DaoConfig::new());
    assert_eq!(lenient.get_table("Invoice").unwrap().name(), "SALES.INVOICE");
    assert_eq!(lenient.get_table("invoice").unwrap().alias(), "inv");
    assert!(lenient.get_table("archive.invoice").unwrap_err().is_not_found());

    let strict = sales(DaoConfig::new().with_strict_table_match(true));
    assert!(strict.get_table("Invoice").unwrap_err().is_not_found());
    assert!(strict.get_table("SALES.INVOICE").is_ok());
    assert!(Record::from_registry(&strict, "Invoice").is_err());
}

#[test]
fn formats_apply_on_read_and_in_predicates() {
    let db = sales(DaoConfig::new());
    let mut gw = ScriptedGateway::new();
    gw.push_rows(vec![Row::from_pairs([
        ("invoiceid", Value::Int(7)),
        ("issued", Value::Date(chrono_date(2003, 2, 1))),
        ("total", Value::Double(12.5)),
    ])]);

    let mut set = RecordSet::new(Record::from_registry(&db, "sales.invoice").unwrap());
    set.read(&mut gw).unwrap();
    let invoice = set.row(0).unwrap();
    assert_eq!(invoice.value("issued").unwrap(), Some("01/02/2003"));
    assert_eq!(invoice.value("total").unwrap(), Some("12.50"));
    assert_eq!(
        invoice.build_where_clause(WhereMode::Delete),
        "where invoiceid=7 and '01/02/2003'=convert(varchar, issued, 103) and total=12.50"
    );
}

#[test]
fn read_nulls_as_empty_from_config() {
    let db = sales(DaoConfig::new().with_read_nulls_as_empty(true));
    let mut invoice = Record::from_registry(&db, "sales.invoice").unwrap();
    assert!(invoice.reads_nulls_as_empty());

    invoice.populate_from_result_row(&Row::from_pairs([
        ("invoiceid", Value::Int(7)),
        ("issued", Value::Null),
        ("total", Value::Null),
    ]));
    let issued = invoice.field("issued").unwrap();
    assert!(issued.is_null());
    assert_eq!(issued.value(), Some(""));
}

fn chrono_date(year: i32, month: u32, day: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
