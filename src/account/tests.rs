//! Unit tests for the account batch runner

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cache::{CachePolicy, MagicFilter, SnapshotCache};
    use crate::error::CalcError;
    use crate::pnl::{EngineOptions, PnlEngine};
    use crate::rates::RateTable;
    use crate::terminal::{AccountCredentials, MockTradingTerminal, SnapshotTerminal};
    use crate::types::{AccountInfo, Quote, RawKind, RawOrder, RawPosition};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn creds(login: u64) -> AccountCredentials {
        AccountCredentials {
            login,
            password: "pw".to_string(),
            server: "Demo-Server".to_string(),
            terminal_path: None,
        }
    }

    fn info(login: u64) -> AccountInfo {
        AccountInfo {
            login,
            server: "Demo-Server".to_string(),
            balance: dec!(10000),
            equity: dec!(10025.4),
            trade_allowed: true,
        }
    }

    fn buy_position() -> RawPosition {
        RawPosition {
            ticket: Some(1),
            symbol: Some("EURUSD".to_string()),
            kind: Some(RawKind::Code(0)),
            volume: Some(dec!(1.0)),
            price_open: Some(dec!(1.1000)),
            sl: Some(dec!(1.0950)),
            tp: Some(dec!(1.1100)),
            profit: Some(dec!(25.4)),
            ..Default::default()
        }
    }

    fn sell_limit() -> RawOrder {
        RawOrder {
            ticket: Some(2),
            symbol: Some("EURUSD".to_string()),
            kind: Some(RawKind::Name("SELL_LIMIT".to_string())),
            volume_initial: Some(dec!(0.5)),
            price_open: Some(dec!(1.2000)),
            sl: Some(dec!(1.2050)),
            tp: Some(dec!(1.1900)),
            ..Default::default()
        }
    }

    fn quote() -> Quote {
        Quote {
            bid: dec!(1.1020),
            ask: dec!(1.1022),
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    fn make_runner(terminal: MockTradingTerminal, retry: RetryPolicy) -> AccountRunner {
        AccountRunner::new(
            Arc::new(terminal),
            PnlEngine::new(RateTable::standard(), EngineOptions::default()),
            SnapshotCache::new(CachePolicy::default(), MagicFilter::allow_all()),
            retry,
        )
    }

    #[tokio::test]
    async fn test_successful_account_figures() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().times(1).returning(|c| Ok(info(c.login)));
        terminal.expect_positions().times(1).returning(|| Ok(vec![buy_position().into()]));
        terminal.expect_orders().times(1).returning(|| Ok(vec![sell_limit().into()]));
        // both items share a symbol: one quote request
        terminal.expect_quote().times(1).returning(|_| Ok(quote()));
        terminal.expect_disconnect().times(1).returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(3));
        let report = runner.process_account(&creds(1001)).await;

        assert!(report.is_success());
        assert_eq!(report.error_message, None);
        assert_eq!(report.account_info.balance, Some(dec!(10000)));
        assert_eq!(report.positions.len(), 1);
        assert_eq!(report.pending_orders.len(), 1);
        assert_eq!(report.skipped_items, 0);

        let pos = &report.positions[0];
        assert_eq!(pos.current_price, dec!(1.1022));
        assert_eq!(pos.figures.potential_loss, dec!(-500));

        let order = &report.pending_orders[0];
        assert_eq!(order.current_price, dec!(1.1020));
        assert_eq!(order.figures.potential_profit, dec!(500));

        assert_eq!(report.summary.combined.total_potential_loss, dec!(-750));
        assert_eq!(report.summary.combined.total_potential_profit, dec!(1500));
        assert_eq!(report.summary.total_profit_loss, dec!(25.4));
    }

    #[tokio::test]
    async fn test_malformed_and_unquoted_items_are_skipped() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| Ok(info(c.login)));
        terminal.expect_positions().returning(|| {
            let mut no_volume = buy_position();
            no_volume.ticket = Some(9);
            no_volume.volume = None;
            let mut gold = buy_position();
            gold.ticket = Some(10);
            gold.symbol = Some("XAUUSD".to_string());
            Ok(vec![buy_position().into(), no_volume.into(), gold.into()])
        });
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal.expect_quote().returning(|symbol: &str| {
            if symbol == "EURUSD" {
                Ok(quote())
            } else {
                Err(CalcError::QuoteUnavailable {
                    symbol: symbol.to_string(),
                    reason: "not in market watch".to_string(),
                })
            }
        });
        terminal.expect_disconnect().returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(1));
        let report = runner.process_account(&creds(1001)).await;

        assert!(report.is_success());
        assert_eq!(report.positions.len(), 1);
        assert_eq!(report.skipped_items, 2);
    }

    #[tokio::test]
    async fn test_unmapped_symbol_skipped_when_configured() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| Ok(info(c.login)));
        terminal.expect_positions().returning(|| {
            let mut exotic = buy_position();
            exotic.symbol = Some("EXOTIC".to_string());
            Ok(vec![exotic.into()])
        });
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal.expect_quote().returning(|_| Ok(quote()));
        terminal.expect_disconnect().returning(|| Ok(()));

        let mut runner = AccountRunner::new(
            Arc::new(terminal),
            PnlEngine::new(
                RateTable::standard(),
                EngineOptions {
                    skip_unmapped_symbols: true,
                    log_missing_symbol_warnings: true,
                },
            ),
            SnapshotCache::default(),
            fast_retry(1),
        );
        let report = runner.process_account(&creds(1)).await;
        assert!(report.is_success());
        assert!(report.positions.is_empty());
        assert_eq!(report.skipped_items, 1);
    }

    #[tokio::test]
    async fn test_wrong_login_is_connection_failure() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().times(2).returning(|_| Ok(info(999)));
        // once per attempt for the wrong session, once more as final cleanup
        terminal.expect_disconnect().times(3).returning(|| Ok(()));
        terminal.expect_positions().never();

        let mut runner = make_runner(terminal, fast_retry(2));
        let report = runner.process_account(&creds(1001)).await;

        assert!(!report.is_success());
        let message = report.error_message.unwrap();
        assert!(message.contains("999"));
        assert!(message.contains("1001"));
    }

    #[tokio::test]
    async fn test_connect_retried_then_succeeds() {
        let mut terminal = MockTradingTerminal::new();
        let mut attempts = 0;
        terminal.expect_connect().times(2).returning(move |c| {
            attempts += 1;
            if attempts == 1 {
                Err(CalcError::ConnectionFailure("terminal busy".to_string()))
            } else {
                Ok(info(c.login))
            }
        });
        terminal.expect_positions().returning(|| Ok(vec![]));
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal.expect_disconnect().times(1).returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(3));
        let report = runner.process_account(&creds(7)).await;
        assert!(report.is_success());
        assert_eq!(report.summary.combined.total_items, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_account_and_still_disconnects() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| Ok(info(c.login)));
        terminal
            .expect_positions()
            .returning(|| Err(CalcError::Terminal("positions_get returned None".to_string())));
        terminal.expect_disconnect().times(1).returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(1));
        let report = runner.process_account(&creds(3)).await;

        assert_eq!(report.processing_status, ProcessingStatus::Failed);
        assert!(report.error_message.unwrap().contains("positions_get"));
    }

    #[tokio::test]
    async fn test_disconnect_error_does_not_fail_account() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| Ok(info(c.login)));
        terminal.expect_positions().returning(|| Ok(vec![]));
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal
            .expect_disconnect()
            .returning(|| Err(CalcError::Terminal("already gone".to_string())));

        let mut runner = make_runner(terminal, fast_retry(1));
        assert!(runner.process_account(&creds(3)).await.is_success());
    }

    #[tokio::test]
    async fn test_batch_with_no_connected_accounts() {
        let mut terminal = MockTradingTerminal::new();
        terminal
            .expect_connect()
            .times(6)
            .returning(|_| Err(CalcError::ConnectionFailure("IPC timeout".to_string())));
        terminal.expect_disconnect().times(3).returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(2));
        let batch = runner.run(&[creds(1), creds(2), creds(3)], None).await;

        let info = &batch.processing_info;
        assert_eq!(info.total_accounts, 3);
        assert_eq!(info.accounts_processed_successfully, 0);
        assert_eq!(info.accounts_failed, 3);
        assert!(info.processing_end_time.is_some());
        assert_eq!(batch.accounts.len(), 3);
        assert!(batch
            .accounts
            .iter()
            .all(|a| a.processing_status == ProcessingStatus::Failed && a.error_message.is_some()));
        assert_eq!(batch.outcome(), BatchOutcome::NoneSucceeded);
        assert_eq!(batch.outcome().exit_code(), 1);
    }

    #[tokio::test]
    async fn test_account_filter() {
        let mut terminal = MockTradingTerminal::new();
        terminal
            .expect_connect()
            .withf(|c: &AccountCredentials| c.login == 2)
            .times(1)
            .returning(|c| Ok(info(c.login)));
        terminal.expect_positions().returning(|| Ok(vec![]));
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal.expect_disconnect().returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(1));
        let batch = runner.run(&[creds(1), creds(2)], Some(2)).await;
        assert_eq!(batch.processing_info.total_accounts, 1);
        assert_eq!(batch.accounts[0].account_info.login, 2);
        assert_eq!(batch.outcome(), BatchOutcome::AllSucceeded);
    }

    #[tokio::test]
    async fn test_unknown_account_filter() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().never();

        let mut runner = make_runner(terminal, fast_retry(1));
        let batch = runner.run(&[creds(1)], Some(42)).await;

        assert_eq!(batch.processing_info.total_accounts, 0);
        assert!(batch.accounts.is_empty());
        assert!(batch.error_message.unwrap().contains("42"));
    }

    #[tokio::test]
    async fn test_partial_batch_over_snapshots() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("1001.json"),
            r#"{
                "account": { "login": 1001, "server": "Demo-Server", "balance": 1000.0, "equity": 990.0 },
                "positions": [
                    { "ticket": 1, "symbol": "EURUSD", "type": "BUY", "volume": 1.0,
                      "price_open": 1.1, "sl": 1.095, "tp": 1.11, "profit": -10.0 }
                ],
                "quotes": { "EURUSD": { "bid": 1.099, "ask": 1.0992 } }
            }"#,
        )
        .unwrap();

        let mut runner = AccountRunner::new(
            Arc::new(SnapshotTerminal::new(dir.path())),
            PnlEngine::new(RateTable::standard(), EngineOptions::default()),
            SnapshotCache::default(),
            fast_retry(1),
        );
        let batch = runner.run(&[creds(1001), creds(2002)], None).await;

        assert_eq!(batch.processing_info.accounts_processed_successfully, 1);
        assert_eq!(batch.processing_info.accounts_failed, 1);
        assert_eq!(batch.outcome(), BatchOutcome::Partial);
        assert_eq!(batch.outcome().exit_code(), 2);

        let ok = &batch.accounts[0];
        assert_eq!(ok.summary.losing_positions, 1);
        assert_eq!(ok.summary.exposure.max_potential_drawdown, dec!(510));

        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["accounts"][0]["processing_status"], "success");
        assert_eq!(json["accounts"][1]["processing_status"], "failed");
        assert!(json.get("error_message").is_none());
    }

    #[tokio::test]
    async fn test_badly_typed_record_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("1001.json"),
            r#"{
                "positions": [
                    { "ticket": 1, "symbol": "EURUSD", "type": 0, "volume": 1.0,
                      "price_open": 1.1, "sl": 1.095, "profit": 4.0 },
                    { "ticket": 2, "symbol": "EURUSD", "type": 0, "volume": "n/a",
                      "price_open": 1.1, "profit": 1.0 }
                ],
                "orders": [ { "ticket": -1, "symbol": "EURUSD", "type": 0.5 } ],
                "quotes": { "EURUSD": { "bid": 1.099, "ask": 1.0992 } }
            }"#,
        )
        .unwrap();

        let mut runner = AccountRunner::new(
            Arc::new(SnapshotTerminal::new(dir.path())),
            PnlEngine::new(RateTable::standard(), EngineOptions::default()),
            SnapshotCache::default(),
            fast_retry(1),
        );
        let report = runner.process_account(&creds(1001)).await;

        assert!(report.is_success(), "{:?}", report.error_message);
        assert_eq!(report.positions.len(), 1);
        assert_eq!(report.positions[0].ticket, 1);
        assert!(report.pending_orders.is_empty());
        assert_eq!(report.skipped_items, 2);
    }

    #[tokio::test]
    async fn test_transient_positions_failure_is_retried() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().times(1).returning(|c| Ok(info(c.login)));
        let mut calls = 0;
        terminal.expect_positions().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Err(CalcError::Terminal("positions_get returned None".to_string()))
            } else {
                Ok(vec![buy_position().into()])
            }
        });
        terminal.expect_orders().times(1).returning(|| Ok(vec![]));
        terminal.expect_quote().returning(|_| Ok(quote()));
        terminal.expect_disconnect().times(1).returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(3));
        let report = runner.process_account(&creds(1001)).await;

        assert!(report.is_success());
        assert_eq!(report.positions.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_quote_failure_is_retried() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| Ok(info(c.login)));
        terminal
            .expect_positions()
            .returning(|| Ok(vec![buy_position().into()]));
        terminal.expect_orders().returning(|| Ok(vec![sell_limit().into()]));
        let mut calls = 0;
        terminal.expect_quote().times(2).returning(move |symbol: &str| {
            calls += 1;
            if calls == 1 {
                Err(CalcError::QuoteUnavailable {
                    symbol: symbol.to_string(),
                    reason: "no tick yet".to_string(),
                })
            } else {
                Ok(quote())
            }
        });
        terminal.expect_disconnect().returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(3));
        let report = runner.process_account(&creds(1001)).await;

        assert_eq!(report.positions.len(), 1);
        assert_eq!(report.pending_orders.len(), 1);
        assert_eq!(report.skipped_items, 0);
    }

    #[tokio::test]
    async fn test_lost_session_while_quoting_fails_account() {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| Ok(info(c.login)));
        terminal
            .expect_positions()
            .returning(|| Ok(vec![buy_position().into()]));
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal
            .expect_quote()
            .times(2)
            .returning(|_| Err(CalcError::Terminal("not connected".to_string())));
        terminal.expect_disconnect().times(1).returning(|| Ok(()));

        let mut runner = make_runner(terminal, fast_retry(2));
        let report = runner.process_account(&creds(1001)).await;

        assert_eq!(report.processing_status, ProcessingStatus::Failed);
        assert!(report.error_message.unwrap().contains("not connected"));
    }

    fn delay_runner(delay: Duration) -> AccountRunner {
        let mut terminal = MockTradingTerminal::new();
        terminal.expect_connect().returning(|c| {
            if c.login == 2 {
                Err(CalcError::ConnectionFailure("rejected".to_string()))
            } else {
                Ok(info(c.login))
            }
        });
        terminal.expect_positions().returning(|| Ok(vec![]));
        terminal.expect_orders().returning(|| Ok(vec![]));
        terminal.expect_disconnect().returning(|| Ok(()));
        make_runner(terminal, fast_retry(1)).with_account_delay(delay)
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_delay_between_accounts_only() {
        let mut runner = delay_runner(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        let batch = runner.run(&[creds(1), creds(2), creds(3)], None).await;

        assert_eq!(batch.processing_info.accounts_failed, 1);
        assert_eq!(start.elapsed().as_secs(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_account_has_no_delay() {
        let mut runner = delay_runner(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        let batch = runner.run(&[creds(1)], None).await;

        assert_eq!(batch.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(start.elapsed().as_secs(), 0);
    }
}
