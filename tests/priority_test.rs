// ==========================================
// 优先级排序集成测试
// ==========================================
// 职责: 验证销售缺口/备库两种依据下的优先级计算与物料内排序
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod priority_test {
    use production_dispatch::api::JobCardRequest;
    use production_dispatch::config::DispatchSettings;
    use production_dispatch::domain::item::{Item, StockPosition};

    use crate::test_helpers::*;

    fn env(position: StockPosition) -> (TestEnv, String, String) {
        let catalog = FakeCatalog::default().with_item(Item::new("FG-1"));
        let stock = FakeStock::default().with_position("FG-1", position);
        let routings = FakeRoutings::default().with_routing(two_step_routing("PS-1", "FG-1", &["RM-A"]));
        let env = setup_env(catalog, stock, routings, DispatchSettings::default());

        let mut ids = Vec::new();
        for operation in ["CUT", "GRIND"] {
            let outcome = env
                .api
                .request_job_card(&JobCardRequest {
                    routing_id: "PS-1".to_string(),
                    operation: operation.to_string(),
                    step_id: None,
                    quantity: 0.0,
                })
                .unwrap();
            ids.push(outcome.job_card_id().to_string());
        }
        let grind = ids.pop().unwrap();
        let cut = ids.pop().unwrap();
        (env, cut, grind)
    }

    #[test]
    fn test_sales_short_ranks_downstream_first() {
        // 缺口 = 500 - 100 = 400 > 在制 0 + 在途 50
        let (env, cut, grind) = env(StockPosition {
            on_sales_order_qty: 500.0,
            finished_qty: 100.0,
            on_purchase_order_qty: 50.0,
            ..Default::default()
        });

        let rankings = env.api.rank_item("FG-1").unwrap();
        assert_eq!(rankings.len(), 2);

        // GRIND 之后无排队: 剩余缺口 350 -> 650
        assert_eq!(rankings[0].job_card_id, grind);
        assert_eq!(rankings[0].priority, 650);
        // CUT 之后排队 GRIND 100: 剩余缺口 250 -> 750
        assert_eq!(rankings[1].job_card_id, cut);
        assert_eq!(rankings[1].priority, 750);
        assert!(rankings.iter().all(|r| r.changed));

        // 再次排序无变化, 不回写
        let again = env.api.rank_item("FG-1").unwrap();
        assert!(again.iter().all(|r| !r.changed));
        assert_eq!(env.repo.get(&grind).unwrap().priority, 650);
        assert_eq!(env.repo.get(&grind).unwrap().revision, 1);
    }

    #[test]
    fn test_stock_building_uses_queue() {
        let (env, cut, grind) = env(StockPosition {
            on_sales_order_qty: 10.0,
            finished_qty: 100.0,
            ..Default::default()
        });

        assert_eq!(env.api.rank_priority(&grind).unwrap(), 2000);
        assert_eq!(env.api.rank_priority(&cut).unwrap(), 2100);
        assert_eq!(env.repo.get(&cut).unwrap().priority, 2100);
    }
}
