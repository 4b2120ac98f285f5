mod query_ast_tests {
    use docquery::config::EngineConfig;
    use docquery::models::enums::{CompareOp, StatementType};
    use docquery::models::structs::{QueryRequest, Row, Scalar};
    use docquery::query_ast::stores::MemoryStore;
    use docquery::query_ast::{QueryAstError, SchemaCatalog, execute, execute_query, parse_sql};
    use serde_json::json;

    fn shop() -> MemoryStore {
        MemoryStore::from_fixture_value(json!({
            "projects": [{
                "id": "shop",
                "tables": [
                    { "name": "users", "columns": ["id", "name", "city"], "rows": [
                        { "id": 1, "name": "Ann", "city": "Oslo" },
                        { "id": 2, "name": "Bo", "city": "Rome" },
                        { "id": 3, "name": "Cy", "city": "Oslo" }
                    ]},
                    { "name": "orders", "columns": ["id", "user_id", "total"], "rows": [
                        { "id": 10, "user_id": 1, "total": 5 },
                        { "id": 11, "user_id": 2, "total": 7 },
                        { "id": 12, "user_id": 99, "total": 3 }
                    ]},
                    { "name": "items", "columns": ["order_id", "sku"], "rows": [
                        { "order_id": 10, "sku": "A" },
                        { "order_id": 10, "sku": "B" },
                        { "order_id": 11, "sku": "C" }
                    ]}
                ]
            }]
        }))
        .expect("fixture")
    }

    async fn query(store: &MemoryStore, sql: &str) -> Result<Vec<Row>, QueryAstError> {
        let schema = store.project_schema("shop").await.expect("schema");
        execute(&parse_sql(sql), &schema, store, EngineConfig::default().row_cap).await
    }

    #[test]
    fn round_trip_parse() {
        let q = parse_sql("SELECT name, age FROM users WHERE age > 18 ORDER BY name LIMIT 10");
        assert!(q.is_valid);
        assert_eq!(q.tables, vec!["users"]);
        assert_eq!(q.columns, vec!["name", "age"]);
        assert_eq!(q.conditions.len(), 1);
        assert_eq!(q.conditions[0].column, "age");
        assert_eq!(q.conditions[0].operator, CompareOp::Gt);
        assert_eq!(q.conditions[0].value, Scalar::Int(18));
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn drop_table_is_unknown_and_invalid() {
        let q = parse_sql("DROP TABLE users");
        assert_eq!(q.statement_type, StatementType::Unknown);
        assert!(!q.is_valid);
    }

    #[tokio::test]
    async fn select_star_is_full_projection_in_store_order() {
        let store = shop();
        let rows = query(&store, "SELECT * FROM users").await.unwrap();
        let names: Vec<&Scalar> = rows.iter().map(|r| &r["name"]).collect();
        assert_eq!(names, vec![&Scalar::text("Ann"), &Scalar::text("Bo"), &Scalar::text("Cy")]);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "name", "city"]);
    }

    #[tokio::test]
    async fn row_cap_applies_per_fetch() {
        let store = shop();
        let schema = store.project_schema("shop").await.unwrap();
        let rows = execute(&parse_sql("SELECT * FROM users"), &schema, &store, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn equality_filter_returns_only_matching_rows() {
        let store = shop();
        let rows = query(&store, "SELECT name, city FROM users WHERE city = 'Oslo'").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["city"] == Scalar::text("Oslo")));
    }

    #[tokio::test]
    async fn and_connected_filters_all_apply() {
        let store = shop();
        let rows = query(&store, "SELECT id FROM users WHERE city = 'Oslo' AND id > 1").await.unwrap();
        assert_eq!(rows, vec![[("id".to_string(), Scalar::Int(3))].into_iter().collect::<Row>()]);
    }

    #[tokio::test]
    async fn join_pairs_ann_and_bo_and_drops_orphan_order() {
        let store = shop();
        let rows = query(&store, "SELECT u.name, o.total FROM users u JOIN orders o ON u.id = o.user_id")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let pairs: Vec<(Scalar, Scalar)> = rows.iter().map(|r| (r["u.name"].clone(), r["o.total"].clone())).collect();
        assert!(pairs.contains(&(Scalar::text("Ann"), Scalar::Int(5))));
        assert!(pairs.contains(&(Scalar::text("Bo"), Scalar::Int(7))));
    }

    #[tokio::test]
    async fn joined_key_columns_agree() {
        let store = shop();
        let rows = query(&store, "SELECT u.id, o.user_id FROM users u INNER JOIN orders o ON u.id = o.user_id")
            .await
            .unwrap();
        assert!(!rows.is_empty());
        for row in rows {
            assert_eq!(row["u.id"], row["o.user_id"]);
        }
    }

    #[tokio::test]
    async fn three_way_join_keeps_base_keys_bare() {
        let store = shop();
        let rows = query(
            &store,
            "SELECT * FROM users u JOIN orders o ON u.id = o.user_id JOIN items i ON o.id = i.order_id",
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 3);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["id", "name", "city", "orders.id", "orders.user_id", "orders.total", "items.order_id", "items.sku"]
        );
    }

    #[tokio::test]
    async fn count_star_alias_over_users() {
        let store = shop();
        let rows = query(&store, "SELECT COUNT(*) AS cnt FROM users WHERE id < 3").await.unwrap();
        assert_eq!(rows, vec![[("cnt".to_string(), Scalar::Int(2))].into_iter().collect::<Row>()]);
    }

    #[tokio::test]
    async fn aggregates_over_zero_rows() {
        let store = shop();
        let rows = query(&store, "SELECT COUNT(*), AVG(id), MIN(id), MAX(id) FROM users WHERE id > 100")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["count_*"], Scalar::Int(0));
        assert_eq!(rows[0]["avg_id"], Scalar::Float(0.0));
        assert_eq!(rows[0]["min_id"], Scalar::Null);
        assert_eq!(rows[0]["max_id"], Scalar::Null);
    }

    #[tokio::test]
    async fn group_by_partitions_every_row_once() {
        let store = shop();
        let rows = query(&store, "SELECT city, COUNT(*) AS n FROM users GROUP BY city").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["city"], Scalar::text("Oslo"));
        let total: i64 = rows
            .iter()
            .map(|r| match r["n"] {
                Scalar::Int(n) => n,
                _ => 0,
            })
            .sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn grouped_join_aggregates_by_alias_reference() {
        let store = shop();
        let rows = query(
            &store,
            "SELECT u.city, SUM(o.total) AS spent FROM users u JOIN orders o ON u.id = o.user_id GROUP BY u.city",
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["u.city"], Scalar::text("Oslo"));
        assert_eq!(rows[0]["spent"], Scalar::Int(5));
        assert_eq!(rows[1]["city"], Scalar::text("Rome"));
        assert_eq!(rows[1]["spent"], Scalar::Int(7));
    }

    #[tokio::test]
    async fn base_alias_column_is_not_read_from_joined_table() {
        let store = MemoryStore::from_fixture_value(json!({
            "projects": [{
                "id": "shop",
                "tables": [
                    { "name": "users", "columns": ["id", "name"], "rows": [
                        { "id": 1, "name": "Ann" },
                        { "id": 2, "name": "Bo" }
                    ]},
                    { "name": "orders", "columns": ["id", "user_id"], "rows": [
                        { "id": 10, "user_id": 1 },
                        { "id": 11, "user_id": 1 },
                        { "id": 12, "user_id": 2 }
                    ]}
                ]
            }]
        }))
        .expect("fixture");

        let rows = query(
            &store,
            "SELECT u.id, COUNT(*) AS n, MIN(u.id) AS m FROM users u JOIN orders o ON u.id = o.user_id GROUP BY u.id",
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["u.id"], Scalar::Int(1));
        assert_eq!(rows[0]["id"], Scalar::Int(1));
        assert_eq!(rows[0]["n"], Scalar::Int(2));
        assert_eq!(rows[0]["m"], Scalar::Int(1));
        assert_eq!(rows[1]["u.id"], Scalar::Int(2));
        assert_eq!(rows[1]["n"], Scalar::Int(1));

        let rows = query(&store, "SELECT SUM(u.id) AS s, SUM(o.id) AS t FROM users u JOIN orders o ON u.id = o.user_id")
            .await
            .unwrap();
        assert_eq!(rows[0]["s"], Scalar::Int(4));
        assert_eq!(rows[0]["t"], Scalar::Int(33));
    }

    #[tokio::test]
    async fn grouped_aggregate_over_no_rows_yields_default_row() {
        let store = shop();
        let rows = query(&store, "SELECT name, COUNT(*) AS n FROM users WHERE id > 100 GROUP BY name")
            .await
            .unwrap();
        assert_eq!(rows, vec![[("n".to_string(), Scalar::Int(0))].into_iter().collect::<Row>()]);
    }

    #[tokio::test]
    async fn execution_errors_are_descriptive() {
        let store = shop();
        let err = query(&store, "SELECT * FROM users u RIGHT JOIN orders o ON u.id = o.user_id").await.unwrap_err();
        assert!(err.to_string().contains("RIGHT"));
        let err = query(&store, "SELECT * FROM users WHERE u.zip = 1").await.unwrap_err();
        assert!(matches!(err, QueryAstError::TableNotFound(_)));
        let err = query(&store, "SELECT * FROM users u WHERE u.zip = 1").await.unwrap_err();
        assert_eq!(err.to_string(), "column 'zip' not found in table 'users'");
    }

    #[tokio::test]
    async fn execute_query_reports_tables_and_count() {
        let store = shop();
        let request = QueryRequest {
            project_id: "shop".into(),
            query: "SELECT u.name FROM users u JOIN orders o ON o.user_id = u.id;".into(),
        };
        let response = execute_query(&request, &store, &store, &EngineConfig::default()).await.unwrap();
        assert_eq!(response.row_count, 2);
        assert_eq!(response.affected_tables, vec!["users", "orders"]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["rows"][0]["u.name"], json!("Ann"));
        assert_eq!(json["rowCount"], json!(2));
    }

    #[cfg(feature = "sqlite_store")]
    #[tokio::test]
    async fn sqlite_store_runs_the_same_join() {
        use docquery::models::structs::row_from_json;
        use docquery::query_ast::stores::SqliteStore;

        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let users = store.create_table("shop", "users", &["id", "name"]).await.unwrap();
        let orders = store.create_table("shop", "orders", &["id", "user_id", "total"]).await.unwrap();
        for v in [json!({"id": 1, "name": "Ann"}), json!({"id": 2, "name": "Bo"})] {
            store.insert_row(&users, &row_from_json(&v)).await.unwrap();
        }
        for v in [json!({"id": 10, "user_id": 1, "total": 5}), json!({"id": 11, "user_id": 2, "total": 7})] {
            store.insert_row(&orders, &row_from_json(&v)).await.unwrap();
        }

        let request = QueryRequest {
            project_id: "shop".into(),
            query: "SELECT u.name, o.total FROM users u JOIN orders o ON u.id = o.user_id WHERE o.total > 6".into(),
        };
        let response = execute_query(&request, &store, &store, &EngineConfig::default()).await.unwrap();
        assert_eq!(response.row_count, 1);
        assert_eq!(response.rows[0]["u.name"], Scalar::text("Bo"));
        assert_eq!(response.rows[0]["o.total"], Scalar::Int(7));
    }
}
