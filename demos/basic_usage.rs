// ============================================================================
// Basic Usage Example
// ============================================================================

use std::sync::Arc;
use tiny_exchange::prelude::*;
use tracing_subscriber::EnvFilter;

const ISIN: &str = "IRO1ABC";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Tiny Exchange Example ===\n");

    let exchange = ExchangeBuilder::new()
        .with_security(SecurityConfig::new(ISIN).with_tick_size(10))
        .with_broker(1, 10_000_000)
        .with_broker(2, 0)
        .with_shareholder(1, &[])
        .with_shareholder(2, &[(ISIN, 1_000)])
        .with_event_handler(Arc::new(LoggingEventHandler))
        .build()
        .expect("example configuration is valid");

    println!("Created exchange for {}\n", ISIN);

    // Sell side: three plain orders and an iceberg
    println!("Adding sell orders...");
    for i in 0u64..3 {
        exchange.handle_enter_order(EnterOrderRq::new_order(
            i + 1,
            ISIN,
            i + 1,
            Side::Sell,
            50,
            15_000 + i * 100,
            2,
            2,
        ));
    }
    exchange.handle_enter_order(
        EnterOrderRq::new_order(4, ISIN, 4, Side::Sell, 300, 15_000, 2, 2).with_peak_size(50),
    );

    // Buy side below the asks
    println!("Adding buy orders...");
    for i in 0u64..3 {
        exchange.handle_enter_order(EnterOrderRq::new_order(
            10 + i,
            ISIN,
            10 + i,
            Side::Buy,
            40,
            14_900 - i * 100,
            1,
            1,
        ));
    }

    print_snapshot(&exchange, "Order Book Snapshot");

    // A buy that sweeps the first ask level, iceberg peaks included
    println!("\n=== Submitting Crossing Buy ===");
    let events =
        exchange.handle_enter_order(EnterOrderRq::new_order(20, ISIN, 20, Side::Buy, 120, 15_000, 1, 1));
    print_events(&events);

    // A stop order waiting for the price to reach 15_100
    println!("\n=== Stop Order ===");
    exchange.handle_enter_order(
        EnterOrderRq::new_order(30, ISIN, 30, Side::Buy, 50, 15_200, 1, 1).with_stop_price(15_100),
    );
    let events =
        exchange.handle_enter_order(EnterOrderRq::new_order(31, ISIN, 31, Side::Buy, 200, 15_100, 1, 1));
    print_events(&events);

    // Call auction
    println!("\n=== Call Auction ===");
    exchange.handle_change_matching_state(ChangeMatchingStateRq::new(ISIN, MatchingState::Auction));
    exchange.handle_enter_order(EnterOrderRq::new_order(40, ISIN, 40, Side::Buy, 30, 15_300, 1, 1));
    let events = exchange
        .handle_change_matching_state(ChangeMatchingStateRq::new(ISIN, MatchingState::Continuous));
    print_events(&events);

    print_snapshot(&exchange, "Final Order Book");
    println!("\nBuyer credit: {:?}", exchange.broker_credit(BrokerId(1)));
    println!("Seller credit: {:?}", exchange.broker_credit(BrokerId(2)));
    println!(
        "Buyer position: {:?}",
        exchange.shareholder_position(ShareholderId(1), ISIN)
    );
}

fn print_snapshot(exchange: &Exchange, title: &str) {
    println!("\n=== {} ===", title);
    let Some(snapshot) = exchange.snapshot(ISIN, 5) else {
        return;
    };

    println!("\nBids:");
    for (price, qty) in &snapshot.bids {
        println!("  {} @ {}", qty, price);
    }

    println!("\nAsks:");
    for (price, qty) in &snapshot.asks {
        println!("  {} @ {}", qty, price);
    }

    println!("\nSpread: {:?}", snapshot.spread);
    println!("Mid Price: {:?}", snapshot.mid_price);
}

fn print_events(events: &[OrderEvent]) {
    println!("\nEvents generated:");
    for event in events {
        match event {
            OrderEvent::OrderExecuted { order_id, trades, .. } => {
                for trade in trades {
                    println!(
                        "  Order {}: trade {} @ {} (qty: {})",
                        order_id, trade.id, trade.price, trade.quantity
                    );
                }
            },
            OrderEvent::AuctionCleared {
                opening_price,
                trades,
                ..
            } => {
                println!(
                    "  Auction cleared at {:?} with {} trades",
                    opening_price,
                    trades.len()
                );
            },
            OrderEvent::OrderActivated { order_id, .. } => {
                println!("  Stop order {} activated", order_id);
            },
            OrderEvent::OrderRejected {
                order_id, reasons, ..
            } => {
                println!("  Order {} rejected: {:?}", order_id, reasons);
            },
            _ => {},
        }
    }
}
