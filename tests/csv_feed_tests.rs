use edge_ranker::filter::FilterStage;
use edge_ranker::source::{load_instrument_feed, read_instrument_feed};

#[test]
/// Verifies malformed rows are reported with their line number and do not
/// abort the read.
fn malformed_rows_become_input_exclusions() {
    let csv = "symbol,name,sector,bid,ask,spread_pct\n\
               AAPL,Apple Inc,Technology,189.9,190.1,\n\
               ,Nameless,Technology,1,2,\n\
               MSFT,Microsoft,Technology,abc,411.2,\n\
               NVDA,Nvidia,Technology,,,0.15\n";
    let feed = read_instrument_feed(csv.as_bytes()).unwrap();

    let symbols: Vec<&str> = feed.instruments.iter().map(|m| m.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "NVDA"]);

    assert_eq!(feed.rejected.len(), 2);
    assert_eq!(feed.rejected[0].symbol, "<line 3>");
    assert!(feed.rejected[0].reason.contains("missing symbol"));
    assert_eq!(feed.rejected[1].symbol, "<line 4>");
    assert!(feed.rejected[1].reason.contains("MSFT: bid 'abc' is not a number"));
    assert!(feed
        .rejected
        .iter()
        .all(|e| e.stage == FilterStage::Input));
}

#[test]
/// Verifies percent-style spreads normalize to decimals and a live quote
/// takes precedence over the spread column.
fn spreads_normalize_to_decimal() {
    let csv = "ticker,name,sector,bid,ask,spread\n\
               AAA,Alpha,Energy,,,1.5\n\
               BBB,Bravo,Energy,9.99,10.01,5\n";
    let feed = read_instrument_feed(csv.as_bytes()).unwrap();
    let a = &feed.instruments[0];
    let b = &feed.instruments[1];
    assert!((a.spread_decimal().unwrap() - 0.015).abs() < 1e-12);
    assert!((b.spread_decimal().unwrap() - 0.002).abs() < 1e-12);
    assert!((b.mid().unwrap() - 10.0).abs() < 1e-12);
}

#[test]
fn short_rows_default_missing_columns() {
    let csv = "symbol,name,sector,currency\n\
               amd,Advanced Micro Devices\n";
    let feed = read_instrument_feed(csv.as_bytes()).unwrap();
    assert_eq!(feed.instruments.len(), 1);
    assert_eq!(feed.instruments[0].symbol, "AMD");
    assert_eq!(feed.instruments[0].sector_label(), "Unknown");
    assert_eq!(feed.instruments[0].currency, "USD");
}

#[test]
fn missing_feed_file_is_an_error() {
    let path = std::env::temp_dir().join(format!("edge-ranker-missing-{}.csv", uuid::Uuid::new_v4()));
    let err = load_instrument_feed(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("failed to open instrument feed"));
}
