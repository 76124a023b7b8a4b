use feedmux::domain::{DomainError, OrderBook};
use feedmux::testkit::domain::{levels, symbol};
use rust_decimal_macros::dec;

fn seeded() -> OrderBook {
    OrderBook::new(
        symbol("BTCUSDT"),
        100,
        levels(&[("10000", "1")]),
        levels(&[("10010", "1")]),
    )
    .unwrap()
}

#[test]
fn modify_removes_and_inserts_levels() {
    let mut book = seeded();

    book.modify(101, &levels(&[("10000", "0")]), &levels(&[("10020", "2")]))
        .unwrap();

    assert!(book.bids().is_empty());
    assert_eq!(book.asks(), levels(&[("10010", "1"), ("10020", "2")]));
    assert_eq!(book.last_update_id(), 101);
    assert!(book.top().is_none());
}

#[test]
fn clone_is_unaffected_by_later_modifications() {
    let mut book = seeded();
    let copy = book.clone();
    let top = copy.top().unwrap();

    book.modify(101, &levels(&[("10000", "0")]), &levels(&[("10005", "3")]))
        .unwrap();

    assert_eq!(copy.top(), Some(top));
    assert_eq!(copy.depth(dec!(10010)), dec!(1));
    assert_eq!(copy.volume(dec!(10010)), dec!(10010));
    assert_eq!(copy.last_update_id(), 100);
    assert_ne!(book.depth(dec!(10010)), copy.depth(dec!(10010)));
}

#[test]
fn limited_clone_keeps_best_levels() {
    let book = OrderBook::new(
        symbol("BTCUSDT"),
        1,
        levels(&[("99", "1"), ("98", "1"), ("97", "1")]),
        levels(&[("101", "1"), ("102", "1"), ("103", "1")]),
    )
    .unwrap();

    let top2 = book.clone_with_limit(2);

    assert_eq!(top2.bids(), levels(&[("99", "1"), ("98", "1")]));
    assert_eq!(top2.asks(), levels(&[("101", "1"), ("102", "1")]));
    assert_eq!(book.bids().len(), 3);
}

#[test]
fn stale_modification_leaves_book_untouched() {
    let mut book = seeded();
    let before = book.clone();

    let result = book.modify(99, &levels(&[("10000", "5")]), &[]);

    assert!(matches!(result, Err(DomainError::StaleUpdate { .. })));
    assert_eq!(book, before);
}

#[test]
fn depth_and_volume_span_both_sides() {
    let book = OrderBook::new(
        symbol("BTCUSDT"),
        1,
        levels(&[("100", "2"), ("99", "3")]),
        levels(&[("101", "1"), ("102", "4")]),
    )
    .unwrap();

    // Bids at or above 100 plus asks at or below 100.
    assert_eq!(book.depth(dec!(100)), dec!(2));
    assert_eq!(book.volume(dec!(100)), dec!(200));
    // Bids at or above 101: none. Asks at or below 101: one.
    assert_eq!(book.depth(dec!(101)), dec!(1));
    assert_eq!(book.volume(dec!(101)), dec!(101));
    assert_eq!(book.top().unwrap().spread(), dec!(1));
}
