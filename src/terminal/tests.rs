//! Unit tests for terminal adapters

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::CalcError;
    use crate::types::RawRecord;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "account": { "login": 1001, "server": "Demo-Server", "balance": 5000.0, "equity": 5025.4 },
        "password": "secret",
        "positions": [
            { "ticket": 11, "symbol": "EURUSD", "type": 0, "volume": 1.0,
              "price_open": 1.1, "sl": 1.095, "tp": 1.11, "profit": 25.4 }
        ],
        "orders": [
            { "ticket": 21, "symbol": "EURUSD", "type": "SELL_LIMIT", "volume_initial": 0.5,
              "price_open": 1.2, "sl": 1.205, "tp": 1.19 }
        ],
        "quotes": { "EURUSD": { "bid": 1.102, "ask": 1.1022 } }
    }"#;

    fn write_snapshot(dir: &TempDir, login: u64, content: &str) {
        std::fs::write(dir.path().join(format!("{}.json", login)), content).unwrap();
    }

    fn creds(login: u64, password: &str) -> AccountCredentials {
        AccountCredentials {
            login,
            password: password.to_string(),
            server: "Demo-Server".to_string(),
            terminal_path: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        write_snapshot(&dir, 1001, SNAPSHOT);
        let terminal = SnapshotTerminal::new(dir.path());

        let info = terminal.connect(&creds(1001, "secret")).await.unwrap();
        assert_eq!(info.login, 1001);
        assert_eq!(info.balance, dec!(5000));

        let positions = terminal.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        let position = positions.into_iter().next().unwrap().into_parsed().unwrap();
        assert_eq!(position.ticket, Some(11));
        let orders = terminal.orders().await.unwrap();
        assert_eq!(orders.len(), 1);

        let quote = terminal.quote("EURUSD").await.unwrap();
        assert_eq!(quote.ask, dec!(1.1022));

        terminal.disconnect().await.unwrap();
        assert!(matches!(terminal.positions().await, Err(CalcError::Terminal(_))));
        // second disconnect is harmless
        terminal.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_keeps_bad_records_individually() {
        let dir = TempDir::new().unwrap();
        write_snapshot(
            &dir,
            1002,
            r#"{
                "positions": [
                    { "ticket": 1, "symbol": "EURUSD", "type": 0, "volume": 1.0, "price_open": 1.1, "profit": 3.0 },
                    { "ticket": 2, "symbol": "EURUSD", "type": 0, "volume": "n/a" }
                ],
                "orders": [ { "ticket": 3, "type": 0.5 } ]
            }"#,
        );
        let terminal = SnapshotTerminal::new(dir.path());
        terminal.connect(&creds(1002, "")).await.unwrap();

        let positions = terminal.positions().await.unwrap();
        assert_eq!(positions.len(), 2);
        assert!(matches!(positions[0], RawRecord::Parsed(_)));
        assert!(matches!(positions[1], RawRecord::Unparsed { .. }));

        let orders = terminal.orders().await.unwrap();
        assert!(matches!(orders[0], RawRecord::Unparsed { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_wrong_password() {
        let dir = TempDir::new().unwrap();
        write_snapshot(&dir, 1001, SNAPSHOT);
        let terminal = SnapshotTerminal::new(dir.path());

        let err = terminal.connect(&creds(1001, "nope")).await.unwrap_err();
        assert!(matches!(err, CalcError::ConnectionFailure(_)));
        assert!(terminal.orders().await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_missing_account() {
        let dir = TempDir::new().unwrap();
        let terminal = SnapshotTerminal::new(dir.path());
        let err = terminal.connect(&creds(4242, "")).await.unwrap_err();
        assert!(matches!(err, CalcError::ConnectionFailure(_)));
    }

    #[tokio::test]
    async fn test_snapshot_unreadable_file() {
        let dir = TempDir::new().unwrap();
        write_snapshot(&dir, 7, "{ not json");
        let terminal = SnapshotTerminal::new(dir.path());
        let err = terminal.connect(&creds(7, "")).await.unwrap_err();
        assert!(matches!(err, CalcError::ConnectionFailure(_)));
    }

    #[tokio::test]
    async fn test_snapshot_unknown_symbol_quote() {
        let dir = TempDir::new().unwrap();
        write_snapshot(&dir, 1001, SNAPSHOT);
        let terminal = SnapshotTerminal::new(dir.path());
        terminal.connect(&creds(1001, "secret")).await.unwrap();

        match terminal.quote("XAUUSD").await {
            Err(CalcError::QuoteUnavailable { symbol, .. }) => assert_eq!(symbol, "XAUUSD"),
            other => panic!("Expected QuoteUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_snapshot_without_account_block() {
        let dir = TempDir::new().unwrap();
        write_snapshot(&dir, 55, r#"{ "positions": [] }"#);
        let terminal = SnapshotTerminal::new(dir.path());

        let info = terminal.connect(&creds(55, "anything")).await.unwrap();
        assert_eq!(info.login, 55);
        assert_eq!(info.server, "Demo-Server");
        assert!(terminal.orders().await.unwrap().is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", creds(1, "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("login: 1"));
    }

    #[test]
    fn test_bridge_trims_base_url() {
        let terminal = BridgeTerminal::new("http://127.0.0.1:8228/", Duration::from_secs(5)).unwrap();
        assert_eq!(terminal.base_url(), "http://127.0.0.1:8228");
    }

    #[tokio::test]
    async fn test_bridge_unreachable_is_connection_failure() {
        // Nothing listens on port 9 locally
        let terminal = BridgeTerminal::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = terminal.connect(&creds(1, "x")).await.unwrap_err();
        assert!(matches!(err, CalcError::ConnectionFailure(_)));

        let err = terminal.quote("EURUSD").await.unwrap_err();
        assert!(matches!(err, CalcError::QuoteUnavailable { .. }));
    }
}
