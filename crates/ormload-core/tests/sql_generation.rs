//! SQL produced for entity and collection load plans across dialects.

use ormload_core::dialect::{Dialect, LockMode, LockOptions};
use ormload_core::mapping::{
    AssociationDef, CollectionSemantics, ElementDef, EnabledFilter, FilterDef, FilterMapping, IdentifierDef,
    IndexDef, KeyAssociationDef, PropertyDef, SubclassDef,
};
use ormload_core::plan::FetchStyle;
use ormload_core::{
    CollectionPersister, EntityPersister, Error, LoadPlanBuilder, LoadQueryDetails, LoadQueryInfluencers,
    LoaderSettings, MappingRegistry, QueryBuildingParameters, ValueType,
};

fn shop_registry(dialect: Dialect) -> MappingRegistry {
    shop_registry_with(dialect, LoaderSettings::new())
}

fn shop_registry_with(dialect: Dialect, settings: LoaderSettings) -> MappingRegistry {
    MappingRegistry::builder(dialect)
        .with_settings(settings)
        .with_filter(FilterDef::new("active").with_parameter("flag", ValueType::Boolean))
        .with_entity(
            EntityPersister::new("Customer", "customers", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("name", "name", ValueType::String))
                .with_property(PropertyDef::collection("orders", "Customer.orders"))
                .with_property(PropertyDef::collection("groups", "Customer.groups"))
                .with_subclass(SubclassDef {
                    name: "Business".into(),
                    table: "businesses".into(),
                    key_columns: vec!["customer_id".into()],
                    properties: vec![PropertyDef::basic("vat", "vat_number", ValueType::String)],
                }),
        )
        .with_entity(
            EntityPersister::new("Order", "orders", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("total", "total", ValueType::Double))
                .with_property(PropertyDef::many_to_one(
                    "customer",
                    AssociationDef::new("Customer", vec!["customer_id".into()]),
                ))
                .with_where("deleted = 0"),
        )
        .with_entity(
            EntityPersister::new("Group", "groups", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("label", "label", ValueType::String)),
        )
        .with_collection(
            CollectionPersister::new(
                "Customer.orders",
                "Customer",
                vec!["customer_id".into()],
                ElementDef::OneToMany {
                    entity: "Order".into(),
                    columns: Vec::new(),
                },
            )
            .with_semantics(CollectionSemantics::Set)
            .with_order_by("total desc"),
        )
        .with_collection(
            CollectionPersister::new(
                "Customer.groups",
                "Customer",
                vec!["customer_id".into()],
                ElementDef::ManyToMany {
                    entity: "Group".into(),
                    columns: vec!["group_id".into()],
                },
            )
            .with_table("customer_groups")
            .with_semantics(CollectionSemantics::Set)
            .with_many_to_many_filter(FilterMapping::new("active", "active = :flag")),
        )
        .build()
        .unwrap()
}

fn entity_sql(registry: &MappingRegistry, entity: &str, fetches: &[&str], params: &QueryBuildingParameters) -> String {
    let plan = fetches
        .iter()
        .fold(LoadPlanBuilder::new(registry), |builder, path| builder.with_fetch(*path))
        .entity_load_plan(entity)
        .unwrap();
    LoadQueryDetails::for_entity(&plan, params, registry)
        .unwrap()
        .sql()
        .to_string()
}

fn active_groups() -> LoadQueryInfluencers {
    let filter = EnabledFilter::new(FilterDef::new("active").with_parameter("flag", ValueType::Boolean))
        .with_parameter("flag", true);
    LoadQueryInfluencers::new().with_filter(filter)
}

#[test]
fn test_subclass_tables_and_discriminator() {
    let registry = shop_registry(Dialect::ansi());
    let sql = entity_sql(&registry, "Customer", &[], &QueryBuildingParameters::new());
    assert!(
        sql.contains(
            " from customers customer0_ left outer join businesses customer0_1_ on customer0_.id=customer0_1_.customer_id"
        ),
        "{sql}"
    );
    assert!(sql.contains("customer0_1_.vat_number as vat_number3_0_"), "{sql}");
    assert!(
        sql.contains("case when customer0_1_.customer_id is not null then 1 when customer0_.id is not null then 0 end"),
        "{sql}"
    );
    assert!(sql.ends_with("where customer0_.id = ?"), "{sql}");
}

#[test]
fn test_join_fetched_collection_and_element_restrictions() {
    let registry = shop_registry(Dialect::ansi());
    let sql = entity_sql(&registry, "Customer", &["orders"], &QueryBuildingParameters::new());
    assert!(sql.contains(" left outer join orders "), "{sql}");
    assert!(sql.contains("customer0_.id="), "{sql}");
    assert!(sql.contains(".deleted = 0"), "{sql}");
    assert!(sql.contains(" order by "), "{sql}");
    assert!(sql.contains(".total desc"), "{sql}");
}

#[test]
fn test_oracle_renders_theta_joins() {
    let registry = shop_registry(Dialect::oracle());
    let sql = entity_sql(&registry, "Order", &["customer"], &QueryBuildingParameters::new());
    assert!(sql.contains(" from orders order0_, customers customer1_"), "{sql}");
    assert!(sql.contains("order0_.customer_id=customer1_.id(+)"), "{sql}");
    assert!(!sql.contains(" join "), "{sql}");
    assert!(sql.contains("order0_.deleted = 0"), "{sql}");
}

#[test]
fn test_many_to_many_filter_joins_on_element() {
    let registry = shop_registry(Dialect::postgres());
    let plan = LoadPlanBuilder::new(&registry)
        .collection_load_plan("Customer.groups")
        .unwrap();
    let params = QueryBuildingParameters::new().with_influencers(active_groups());
    let details = LoadQueryDetails::for_collection(&plan, &params, &registry).unwrap();
    let sql = details.sql();
    assert!(sql.contains(" from customer_groups groups0_ "), "{sql}");
    assert!(
        sql.contains("join groups group1_ on groups0_.group_id=group1_.id and group1_.active = :active.flag"),
        "{sql}"
    );
    assert!(sql.ends_with("where groups0_.customer_id = ?"), "{sql}");

    let unfiltered =
        LoadQueryDetails::for_collection(&plan, &QueryBuildingParameters::new(), &registry).unwrap();
    assert!(!unfiltered.sql().contains(":active.flag"));
}

#[test]
fn test_lock_rendering_per_dialect() {
    let lock = QueryBuildingParameters::new().with_lock_options(LockOptions::new(LockMode::PessimisticWrite));

    let postgres = shop_registry(Dialect::postgres());
    assert!(entity_sql(&postgres, "Group", &[], &lock).ends_with("where group0_.id = ? for update"));

    let sql_server = shop_registry(Dialect::sql_server());
    let sql = entity_sql(&sql_server, "Group", &[], &lock);
    assert!(sql.contains(" from groups group0_ with (updlock, rowlock) "), "{sql}");
    assert!(!sql.contains("for update"), "{sql}");

    let read = QueryBuildingParameters::new().with_lock_options(LockOptions::new(LockMode::PessimisticRead));
    assert!(entity_sql(&postgres, "Group", &[], &read).ends_with(" for share"));
}

#[test]
fn test_aliases_do_not_depend_on_dialect() {
    let ansi = shop_registry(Dialect::ansi());
    let oracle = shop_registry(Dialect::oracle());
    let aliases = |registry: &MappingRegistry| {
        let plan = LoadPlanBuilder::new(registry)
            .with_fetch("orders")
            .entity_load_plan("Customer")
            .unwrap();
        LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), registry)
            .unwrap()
            .table_aliases()
            .to_vec()
    };
    assert_eq!(aliases(&ansi), aliases(&oracle));
}

#[test]
fn test_plan_tree_is_kept_with_details() {
    let registry = shop_registry(Dialect::ansi());
    let plan = LoadPlanBuilder::new(&registry)
        .with_fetch("orders")
        .entity_load_plan("Customer")
        .unwrap();
    let details = LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), &registry).unwrap();
    let tree = details.plan_tree();
    assert!(tree.contains("EntityReturn(entity=Customer"), "{tree}");
    assert!(tree.contains("QuerySpaces"), "{tree}");
}

#[test]
fn test_unknown_fetch_path() {
    let registry = shop_registry(Dialect::ansi());
    let result = LoadPlanBuilder::new(&registry)
        .with_fetch("missing")
        .entity_load_plan("Customer");
    assert!(matches!(result, Err(Error::IllegalArgument(_))));
}

fn eager_registry(settings: LoaderSettings) -> MappingRegistry {
    MappingRegistry::builder(Dialect::ansi())
        .with_settings(settings)
        .with_entity(EntityPersister::new("A", "a", IdentifierDef::new("id", "id", ValueType::Long)).with_property(
            PropertyDef::many_to_one(
                "b",
                AssociationDef::new("B", vec!["b_id".into()])
                    .with_fetch(FetchStyle::Join)
                    .with_lazy(false),
            ),
        ))
        .with_entity(EntityPersister::new("B", "b", IdentifierDef::new("id", "id", ValueType::Long)))
        .build()
        .unwrap()
}

#[test]
fn test_mapped_join_fetch_style() {
    let registry = eager_registry(LoaderSettings::new());
    let sql = entity_sql(&registry, "A", &[], &QueryBuildingParameters::new());
    assert!(sql.contains(" left outer join b b1_ on a0_.b_id=b1_.id"), "{sql}");
}

#[test]
fn test_fetch_depth_limits_mapped_joins() {
    let registry = eager_registry(LoaderSettings::new().with_max_fetch_depth(0));
    let sql = entity_sql(&registry, "A", &[], &QueryBuildingParameters::new());
    assert!(!sql.contains(" join "), "{sql}");

    // explicit fetches are not limited
    let sql = entity_sql(&registry, "A", &["b"], &QueryBuildingParameters::new());
    assert!(sql.contains(" left outer join b b1_ "), "{sql}");
}

#[test]
fn test_bidirectional_one_to_one_joins_once() {
    let registry = MappingRegistry::builder(Dialect::ansi())
        .with_entity(EntityPersister::new("A", "a", IdentifierDef::new("id", "id", ValueType::Long)).with_property(
            PropertyDef::many_to_one(
                "b",
                AssociationDef::new("B", vec!["b_id".into()]).with_fetch(FetchStyle::Join),
            ),
        ))
        .with_entity(
            EntityPersister::new("B", "b", IdentifierDef::new("id", "id", ValueType::Long)).with_property(
                PropertyDef::one_to_one("a", AssociationDef::mapped_by("A", "b").with_fetch(FetchStyle::Join)),
            ),
        )
        .build()
        .unwrap();
    let sql = entity_sql(&registry, "A", &[], &QueryBuildingParameters::new());
    assert!(sql.contains(" from a a0_ left outer join b b1_ on a0_.b_id=b1_.id"), "{sql}");
    assert_eq!(sql.matches(" join ").count(), 1, "{sql}");

    let plan = LoadPlanBuilder::new(&registry).entity_load_plan("A").unwrap();
    let tree = LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), &registry)
        .unwrap()
        .plan_tree()
        .to_string();
    assert!(tree.contains("BidirectionalEntityFetch(path=b.a"), "{tree}");
}

#[test]
fn test_many_to_many_fetch_joins_three_tables() {
    let registry = shop_registry(Dialect::ansi());
    let plan = LoadPlanBuilder::new(&registry)
        .with_fetch("groups")
        .entity_load_plan("Customer")
        .unwrap();
    let details = LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), &registry).unwrap();
    let sql = details.sql();
    assert!(
        sql.contains(
            " left outer join customer_groups groups1_ on customer0_.id=groups1_.customer_id \
             left outer join groups group2_ on groups1_.group_id=group2_.id"
        ),
        "{sql}"
    );
    assert!(sql.contains("groups1_.customer_id as "), "{sql}");
    assert!(sql.contains("groups1_.group_id as "), "{sql}");
    assert!(sql.contains("group2_.label as "), "{sql}");
    let mut aliases: Vec<&str> = details.table_aliases().iter().map(|(_, alias)| alias.as_str()).collect();
    aliases.sort_unstable();
    assert_eq!(aliases, vec!["customer0_", "group2_", "groups1_"]);
}

fn order_line_registry() -> MappingRegistry {
    MappingRegistry::builder(Dialect::ansi())
        .with_entity(
            EntityPersister::new(
                "Line",
                "order_lines",
                IdentifierDef::composite(
                    "id",
                    vec!["order_id".into(), "line_no".into()],
                    ValueType::Composite(vec![ValueType::Long, ValueType::Integer]),
                )
                .with_key_association(KeyAssociationDef {
                    name: "order".into(),
                    target: "Order".into(),
                    columns: vec!["order_id".into()],
                    fetch: FetchStyle::Join,
                }),
            )
            .with_property(PropertyDef::basic("quantity", "quantity", ValueType::Integer))
            .with_property(PropertyDef::component(
                "address",
                vec![
                    PropertyDef::basic("street", "street", ValueType::String),
                    PropertyDef::many_to_one(
                        "country",
                        AssociationDef::new("Country", vec!["country_id".into()]).with_fetch(FetchStyle::Join),
                    ),
                ],
            )),
        )
        .with_entity(EntityPersister::new("Order", "orders", IdentifierDef::new("id", "id", ValueType::Long)))
        .with_entity(
            EntityPersister::new("Country", "countries", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("name", "name", ValueType::String)),
        )
        .build()
        .unwrap()
}

#[test]
fn test_composites_share_owner_alias_and_key_fetches_come_first() {
    let registry = order_line_registry();
    let plan = LoadPlanBuilder::new(&registry).entity_load_plan("Line").unwrap();
    let details = LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), &registry).unwrap();
    let aliases: Vec<&str> = details.table_aliases().iter().map(|(_, alias)| alias.as_str()).collect();
    assert_eq!(aliases, vec!["line0_", "order1_", "country2_"]);

    let sql = details.sql();
    assert!(
        sql.contains(
            " from order_lines line0_ inner join orders order1_ on line0_.order_id=order1_.id \
             left outer join countries country2_ on line0_.country_id=country2_.id"
        ),
        "{sql}"
    );
    let order_columns = sql.find("order1_.id as ").unwrap();
    let country_columns = sql.find("country2_.id as ").unwrap();
    assert!(order_columns < country_columns, "{sql}");
    assert_eq!(sql.matches("line0_.order_id as ").count(), 1, "{sql}");
}

fn store_registry() -> MappingRegistry {
    MappingRegistry::builder(Dialect::ansi())
        .with_entity(
            EntityPersister::new("Store", "stores", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::collection("stock", "Store.stock")),
        )
        .with_entity(
            EntityPersister::new("Product", "products", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("name", "name", ValueType::String)),
        )
        .with_collection(
            CollectionPersister::new(
                "Store.stock",
                "Store",
                vec!["store_id".into()],
                ElementDef::Basic {
                    column: "quantity".into(),
                    value_type: ValueType::Integer,
                },
            )
            .with_table("store_stock")
            .with_semantics(CollectionSemantics::Map)
            .with_index(IndexDef::Entity {
                entity: "Product".into(),
                columns: vec!["product_id".into()],
            }),
        )
        .build()
        .unwrap()
}

#[test]
fn test_entity_keyed_map_joins_its_index() {
    let registry = store_registry();
    let plan = LoadPlanBuilder::new(&registry)
        .with_fetch("stock")
        .entity_load_plan("Store")
        .unwrap();
    let details = LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), &registry).unwrap();
    let sql = details.sql();
    assert!(
        sql.contains(
            " from stores store0_ left outer join store_stock stock1_ on store0_.id=stock1_.store_id \
             left outer join products product2_ on stock1_.product_id=product2_.id"
        ),
        "{sql}"
    );
    assert!(sql.contains("stock1_.product_id as "), "{sql}");
    assert!(sql.contains("product2_.name as "), "{sql}");
    assert!(details.plan_tree().contains("collection index"), "{}", details.plan_tree());
    assert_eq!(details.row_reader().entity_readers().len(), 2);
}

#[test]
fn test_entity_keyed_map_initializer_joins_its_index() {
    let registry = store_registry();
    let plan = LoadPlanBuilder::new(&registry)
        .collection_load_plan("Store.stock")
        .unwrap();
    let details = LoadQueryDetails::for_collection(&plan, &QueryBuildingParameters::new(), &registry).unwrap();
    let sql = details.sql();
    assert!(
        sql.contains(" from store_stock stock0_ left outer join products product1_ on stock0_.product_id=product1_.id"),
        "{sql}"
    );
    assert!(sql.contains("product1_.name as "), "{sql}");
    assert!(sql.ends_with("where stock0_.store_id = ?"), "{sql}");
}
