use std::sync::Arc;

use daodb::prelude::*;
use daodb::testing::{GatewayEvent, ScriptedGateway};

fn shop() -> SchemaRegistry {
    let mut db = SchemaRegistry::new("shop");
    db.add_table(
        TableDescriptor::new(
            "Item",
            vec![
                FieldDescriptor::new("itemID", FieldType::IntIdentity).unwrap(),
                FieldDescriptor::new("Description", FieldType::Varchar).unwrap(),
                FieldDescriptor::new("Price", FieldType::Float).unwrap(),
            ],
        )
        .unwrap(),
    );
    db.add_table(
        TableDescriptor::new(
            "Orders",
            vec![
                FieldDescriptor::new("orderid", FieldType::IntIdentity).unwrap(),
                FieldDescriptor::new("OrderData", FieldType::Varchar).unwrap(),
            ],
        )
        .unwrap(),
    );
    db.add_table(
        TableDescriptor::new(
            "OrderLine",
            vec![
                FieldDescriptor::new("lineid", FieldType::IntIdentity).unwrap(),
                FieldDescriptor::new("orderid", FieldType::Integer).unwrap(),
                FieldDescriptor::new("itemid", FieldType::Integer).unwrap(),
                FieldDescriptor::new("quantity", FieldType::Integer).unwrap(),
            ],
        )
        .unwrap(),
    );
    db
}

fn item_row(id: i64, description: &str, price: &str) -> Row {
    Row::from_pairs([
        ("itemid", Value::Int(id)),
        ("description", Value::from(description)),
        ("price", Value::Decimal(price.to_string())),
    ])
}

fn order_line_record(db: &SchemaRegistry) -> Record {
    let orders = db
        .join_table("Orders o", "o.orderid = a.orderid", &["OrderData"])
        .unwrap();
    let item = db
        .join_table("Item it", "it.itemid = a.itemid", &["Description"])
        .unwrap();
    Record::from_registry(db, "OrderLine")
        .unwrap()
        .with_extra(Arc::new(orders))
        .unwrap()
        .with_extra(Arc::new(item))
        .unwrap()
}

#[test]
fn insert_then_update_item() {
    let db = shop();
    let mut item = Record::from_registry(&db, "Item").unwrap();
    item.set_field_value("Description", "PC Athlon").unwrap();
    item.set_field_value("Price", "5.00").unwrap();
    assert_eq!(
        item.generate_insert_sql().unwrap(),
        "insert into ITEM (description, price) values ('PC Athlon', 5.00)"
    );

    let mut gw = ScriptedGateway::new();
    gw.push_generated_key("1");
    item.save(&mut gw).unwrap();
    assert_eq!(item.value("itemID").unwrap(), Some("1"));
    assert_eq!(item.state(), RecordState::Loaded);

    item.set_field_value("Description", "PC Intel").unwrap();
    assert_eq!(item.state(), RecordState::PendingUpdate);
    assert_eq!(
        item.generate_update_sql().unwrap(),
        "update ITEM set description='PC Intel' where itemid=1 and description='PC Athlon' and price=5.00"
    );

    item.save(&mut gw).unwrap();
    assert_eq!(
        gw.statements(),
        vec![
            "insert into ITEM (description, price) values ('PC Athlon', 5.00)",
            "update ITEM set description='PC Intel' where itemid=1 and description='PC Athlon' and price=5.00",
        ]
    );
    assert_eq!(item.state(), RecordState::Loaded);
}

#[test]
fn joined_search_builds_from_and_where() {
    let db = shop();
    let mut set = RecordSet::new(order_line_record(&db));
    set.set_search_param("OrderData", "cash").unwrap();

    let sql = set.generate_select_sql();
    assert_eq!(
        sql,
        "select a.*, o.orderdata, it.description \
         from ORDERLINE a, ORDERS o, ITEM it \
         where o.orderid = a.orderid and it.itemid = a.itemid and o.orderdata='cash'"
    );
    assert!(sql.contains("orderdata='cash'"));
}

#[test]
fn joined_read_maps_extra_columns() {
    let db = shop();
    let mut set = RecordSet::new(order_line_record(&db));
    set.set_search_param("OrderData", "cash").unwrap();

    let mut gw = ScriptedGateway::new();
    gw.push_rows(vec![Row::from_pairs([
        ("lineid", Value::Int(10)),
        ("orderid", Value::Int(7)),
        ("itemid", Value::Int(2)),
        ("quantity", Value::Int(3)),
        ("orderdata", Value::from("cash")),
        ("description", Value::from("PC Intel")),
    ])]);
    assert_eq!(set.read(&mut gw).unwrap(), 1);
    assert_eq!(gw.queries(), vec![set.generate_select_sql().as_str()]);

    let line = set.row(0).unwrap();
    assert_eq!(line.state(), RecordState::Loaded);
    assert_eq!(line.value("quantity").unwrap(), Some("3"));
    assert_eq!(line.value("o.orderdata").unwrap(), Some("cash"));
    assert_eq!(line.value("it.description").unwrap(), Some("PC Intel"));
}

#[test]
fn join_keyword_condition_goes_to_from() {
    let db = shop();
    let orders = db
        .join_table(
            "Orders o",
            "left join ORDERS o on o.orderid = a.orderid",
            &["OrderData"],
        )
        .unwrap();
    let line = Record::from_registry(&db, "OrderLine")
        .unwrap()
        .with_extra(Arc::new(orders))
        .unwrap();
    let mut set = RecordSet::new(line);
    set.set_search_param("orderdata", "cash").unwrap();
    assert_eq!(
        set.generate_select_sql(),
        "select a.*, o.orderdata from ORDERLINE a left join ORDERS o on o.orderid = a.orderid \
         where o.orderdata='cash'"
    );
}

#[test]
fn forced_null_without_value() {
    let db = shop();
    let mut item = Record::from_registry(&db, "Item").unwrap();
    item.mark_where_is_null("Description").unwrap();
    assert!(item.value("description").unwrap().is_none());
    assert_eq!(
        item.build_where_clause(WhereMode::Select),
        "from ITEM a where a.description is null"
    );
}

#[test]
fn failed_batch_rolls_back_and_keeps_states() {
    let db = shop();
    let mut gw = ScriptedGateway::new();
    gw.push_rows(vec![
        item_row(1, "PC", "1.00"),
        item_row(2, "Mac", "2.00"),
        item_row(3, "Amiga", "3.00"),
    ]);

    let mut set = RecordSet::new(Record::from_registry(&db, "Item").unwrap());
    set.read(&mut gw).unwrap();
    for row in set.rows_mut() {
        row.set_field_value("price", "9.99").unwrap();
    }
    gw.clear_events();
    gw.fail_on_statement(2);

    let err = set.save(&mut gw).unwrap_err();
    assert!(matches!(err, Error::Statement(_)));
    assert!(err.sql().is_some_and(|sql| sql.contains("itemid=2")));

    assert_eq!(set.row_count(), 3);
    for row in set.rows() {
        assert_eq!(row.state(), RecordState::PendingUpdate);
        let price = row.field("price").unwrap();
        assert!(price.is_dirty());
        assert_eq!(price.value(), Some("9.99"));
    }
    assert_eq!(gw.events()[0], GatewayEvent::Begin);
    assert_eq!(gw.statements().len(), 2);
    assert_eq!(gw.count(&GatewayEvent::Rollback), 1);
    assert_eq!(gw.count(&GatewayEvent::Commit), 0);
    assert!(!gw.in_transaction());

    // the whole set can be retried
    let mut retry = ScriptedGateway::new();
    set.save(&mut retry).unwrap();
    assert!(set.rows().iter().all(|r| r.state() == RecordState::Loaded));
    assert_eq!(retry.statements().len(), 3);
    assert_eq!(retry.count(&GatewayEvent::Commit), 1);
}

#[test]
fn conflict_in_batch_rolls_back() {
    let db = shop();
    let mut gw = ScriptedGateway::new();
    gw.push_rows(vec![item_row(1, "PC", "1.00"), item_row(2, "Mac", "2.00")]);

    let mut set = RecordSet::new(Record::from_registry(&db, "Item").unwrap());
    set.read(&mut gw).unwrap();
    set.row_mut(0).unwrap().mark_for_delete();
    set.row_mut(1)
        .unwrap()
        .set_field_value("description", "iMac")
        .unwrap();

    gw.push_affected_rows(1).push_affected_rows(0);
    let err = set.save(&mut gw).unwrap_err();
    assert!(err.is_concurrency_conflict());
    assert!(err.is_retryable());

    assert_eq!(set.row_count(), 2);
    assert_eq!(set.row(0).unwrap().state(), RecordState::PendingDelete);
    assert_eq!(set.row(0).unwrap().value("description").unwrap(), Some("PC"));
    assert_eq!(set.row(1).unwrap().state(), RecordState::PendingUpdate);
    assert_eq!(gw.count(&GatewayEvent::Rollback), 1);
}

#[test]
fn mixed_batch_commits_once() {
    let db = shop();
    let mut gw = ScriptedGateway::new();
    gw.push_rows(vec![item_row(1, "PC", "1.00"), item_row(2, "Mac", "2.00")]);

    let mut set = RecordSet::new(Record::from_registry(&db, "Item").unwrap());
    set.read(&mut gw).unwrap();
    set.row_mut(0).unwrap().mark_for_delete();
    set.row_mut(1).unwrap().set_field_value("price", "2.50").unwrap();
    let mut fresh = set.new_row();
    fresh.set_field_value("description", "Amiga").unwrap();
    set.add_row(fresh);

    gw.clear_events();
    gw.push_generated_key("3");
    set.save(&mut gw).unwrap();

    assert_eq!(
        gw.statements(),
        vec![
            "delete from ITEM where itemid=1 and description='PC' and price=1.00",
            "update ITEM set price=2.50 where itemid=2 and description='Mac' and price=2.00",
            "insert into ITEM (description) values ('Amiga')",
        ]
    );
    assert_eq!(gw.events().first(), Some(&GatewayEvent::Begin));
    assert_eq!(gw.events().last(), Some(&GatewayEvent::Commit));

    assert_eq!(set.row_count(), 2);
    assert!(set.iter().all(|r| r.state() == RecordState::Loaded));
    assert_eq!(set.row(1).unwrap().value("itemid").unwrap(), Some("3"));
}
