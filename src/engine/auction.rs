// ============================================================================
// Opening Price Discovery
// ============================================================================

use crate::domain::{Order, OrderBook, Side};
use crate::numeric::{Price, Quantity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clearing price of a call auction and the quantity it would execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OpeningPrice {
    pub price: Price,
    pub tradable_quantity: Quantity,
}

/// Quantity executable at `price`: the smaller of the buy quantity willing to
/// pay at least `price` and the sell quantity willing to accept at most `price`
pub fn tradable_quantity(book: &OrderBook, price: Price) -> Quantity {
    book.cumulative_quantity(Side::Buy, price)
        .min(book.cumulative_quantity(Side::Sell, price))
}

/// Find the price maximizing tradable quantity.
///
/// Candidates are the `tick_size` grid from the best sell price up to the best
/// buy price. Ties go to the candidate closest to `last_trade_price`, then to
/// the lowest candidate. Returns `None` when the book does not cross.
///
/// Tradable quantity is a step function that only moves at order prices, so
/// only the grid points bounding each step are evaluated, together with the
/// grid neighbours of the last trade price.
pub fn find_opening_price(
    book: &OrderBook,
    last_trade_price: Option<Price>,
    tick_size: Price,
) -> Option<OpeningPrice> {
    let best_buy = book.best(Side::Buy)?.price;
    let best_sell = book.best(Side::Sell)?.price;
    if best_buy < best_sell {
        return None;
    }

    let candidates = candidate_prices(book, last_trade_price, best_sell, best_buy, tick_size.max(1));
    let distance = |price: Price| last_trade_price.map(|last| price.abs_diff(last));

    // buy queue runs highest price first, sell queue lowest first
    let mut buys = book.queue(Side::Buy).iter().rev().peekable();
    let mut buy_quantity: Quantity = book.queue(Side::Buy).iter().map(Order::total_quantity).sum();
    let mut sells = book.queue(Side::Sell).iter().peekable();
    let mut sell_quantity: Quantity = 0;

    let mut best: Option<OpeningPrice> = None;
    for candidate in candidates {
        while let Some(order) = buys.next_if(|order| order.price < candidate) {
            buy_quantity -= order.total_quantity();
        }
        while let Some(order) = sells.next_if(|order| order.price <= candidate) {
            sell_quantity += order.total_quantity();
        }

        let quantity = buy_quantity.min(sell_quantity);
        let better = match best {
            None => quantity > 0,
            Some(current) => {
                quantity > current.tradable_quantity
                    || (quantity == current.tradable_quantity
                        && distance(candidate) < distance(current.price))
            },
        };
        if better {
            best = Some(OpeningPrice {
                price: candidate,
                tradable_quantity: quantity,
            });
        }
    }

    tracing::debug!(
        "Opening price between {} and {}: {:?}",
        best_sell,
        best_buy,
        best
    );
    best
}

/// Ascending grid prices in `[low, high]` where a run of equal tradable
/// quantity can start or end, plus the grid points around `last_trade_price`
fn candidate_prices(
    book: &OrderBook,
    last_trade_price: Option<Price>,
    low: Price,
    high: Price,
    step: Price,
) -> Vec<Price> {
    let floor = |price: Price| low + price.saturating_sub(low) / step * step;
    let ceil = |price: Price| {
        let below = floor(price);
        if below < price {
            below.saturating_add(step)
        } else {
            below
        }
    };

    let mut candidates = vec![low, floor(high)];
    let prices = book
        .queue(Side::Buy)
        .iter()
        .chain(book.queue(Side::Sell).iter())
        .map(|order| order.price)
        .chain(last_trade_price);
    for price in prices {
        candidates.extend([
            floor(price),
            ceil(price),
            floor(price.saturating_sub(1)),
            ceil(price.saturating_add(1)),
        ]);
    }

    candidates.retain(|price| *price <= high);
    candidates.sort_unstable();
    candidates.dedup();
    candidates
}
