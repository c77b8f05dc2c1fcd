// src/gate.rs
//! Execution gate: a linear chain of vetoes between the top-ranked candidate
//! and a live order. Each veto is independently sufficient to deny. Dedup state
//! is committed only after the broker confirms the order, so a failed placement
//! leaves the headline eligible for the next cycle.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::broker::{Broker, OrderOutcome, OrderRequest, Quote, Side};
use crate::config::{BotConfig, RiskCfg};
use crate::dedup::{SeenSet, SeenStore};
use crate::rank::RankedCandidate;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("gate_denied_total", "Candidates denied by a gate veto.");
        describe_counter!("gate_orders_total", "Orders submitted to the broker.");
        describe_counter!("gate_fills_total", "Orders confirmed by the broker.");
    });
}

/// Why the gate refused to act. Carries the numbers involved so a "did nothing"
/// cycle is reconstructible from logs alone.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDenial {
    AlreadySeen,
    /// No pip size / precision configured for the classified instrument, so the
    /// order cannot be sized.
    InstrumentUnconfigured { instrument: String },
    SpreadTooWide { spread: f64, max: f64 },
    SpreadUnknown,
    CooldownActive { remaining_secs: i64 },
    ConcurrencyExhausted { open: usize, max: usize },
    ConcurrencyUnknown,
    PositionExists { instrument: String },
    /// Position query failed; fail-closed, treated the same as an open position.
    PositionUnknown { instrument: String },
}

impl GateDenial {
    pub fn reason_code(&self) -> &'static str {
        match self {
            GateDenial::AlreadySeen => "already_seen",
            GateDenial::InstrumentUnconfigured { .. } => "instrument_unconfigured",
            GateDenial::SpreadTooWide { .. } => "spread_too_wide",
            GateDenial::SpreadUnknown => "spread_unknown",
            GateDenial::CooldownActive { .. } => "cooldown_active",
            GateDenial::ConcurrencyExhausted { .. } => "concurrency_exhausted",
            GateDenial::ConcurrencyUnknown => "concurrency_unknown",
            GateDenial::PositionExists { .. } => "position_exists",
            GateDenial::PositionUnknown { .. } => "position_unknown",
        }
    }
}

#[derive(Debug)]
pub enum GateOutcome {
    Denied(GateDenial),
    Executed {
        side: Side,
        order: OrderRequest,
        order_id: Option<String>,
        fill_price: Option<f64>,
    },
    OrderRejected {
        status: u16,
    },
}

/// In-process gate memory. Deliberately not persisted: losing it on restart at
/// worst allows one trade sooner than the cooldown intended, and the
/// concurrency/position checks re-query live broker state every cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct GateState {
    pub last_trade_time: Option<DateTime<Utc>>,
}

/// Fixed-fractional sizing: `units = risk_usd / (sl_pips * pip)`, rounded to
/// the nearest 10, floored at the minimum lot.
pub fn units_for_risk(risk_usd: f64, sl_pips: f64, pip: f64, min_units: i64) -> i64 {
    let raw = risk_usd / (sl_pips * pip);
    let rounded = (raw / 10.0).round() as i64 * 10;
    rounded.max(min_units)
}

/// Order parameters for a cleared candidate: entry at ask (buy) / bid (sell),
/// TP/SL offset by the configured pip distances. `None` when the instrument has
/// no pip size or precision configured; sizing never guesses.
pub fn build_order(
    risk: &RiskCfg,
    instrument: &str,
    side: Side,
    quote: &Quote,
) -> Option<OrderRequest> {
    let pip = risk.pip_for(instrument)?;
    let precision = risk.precision_for(instrument)?;
    let entry = match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    };
    let (tp, sl, sign) = match side {
        Side::Buy => (entry + risk.tp_pips * pip, entry - risk.sl_pips * pip, 1),
        Side::Sell => (entry - risk.tp_pips * pip, entry + risk.sl_pips * pip, -1),
    };
    let units = units_for_risk(risk.risk_usd, risk.sl_pips, pip, risk.min_units);
    Some(OrderRequest {
        instrument: instrument.to_string(),
        units: sign * units,
        take_profit: tp,
        stop_loss: sl,
        precision,
    })
}

pub struct ExecutionGate<'a> {
    cfg: &'a BotConfig,
    store: &'a SeenStore,
}

impl<'a> ExecutionGate<'a> {
    pub fn new(cfg: &'a BotConfig, store: &'a SeenStore) -> Self {
        ensure_metrics_described();
        Self { cfg, store }
    }

    /// Run the veto chain for `top` and, if everything passes, place the order.
    /// Returns the (possibly updated) seen set alongside the outcome; the
    /// caller's copy of the set stays authoritative.
    pub async fn try_execute(
        &self,
        top: &RankedCandidate,
        seen: SeenSet,
        state: &mut GateState,
        broker: &dyn Broker,
        now: DateTime<Utc>,
    ) -> (SeenSet, GateOutcome) {
        match self.check_vetoes(top, &seen, state, broker, now).await {
            Err(denial) => {
                counter!("gate_denied_total", "reason" => denial.reason_code()).increment(1);
                info!(
                    reason = denial.reason_code(),
                    detail = ?denial,
                    title = %crate::ingest::excerpt(&top.candidate.item.title),
                    "gate denied"
                );
                (seen, GateOutcome::Denied(denial))
            }
            Ok(quote) => self.place(top, seen, state, broker, now, &quote).await,
        }
    }

    async fn check_vetoes(
        &self,
        top: &RankedCandidate,
        seen: &SeenSet,
        state: &GateState,
        broker: &dyn Broker,
        now: DateTime<Utc>,
    ) -> Result<Quote, GateDenial> {
        // 1) Already seen. The ranker excludes these; the gate re-checks anyway.
        if seen.contains(&top.id) {
            return Err(GateDenial::AlreadySeen);
        }

        // 2) Sizing parameters must exist for the classified instrument.
        //    Checked before any broker query so an unsizeable candidate costs
        //    no network round trips.
        let instrument = &top.candidate.instrument;
        if self.cfg.risk.pip_for(instrument).is_none()
            || self.cfg.risk.precision_for(instrument).is_none()
        {
            return Err(GateDenial::InstrumentUnconfigured {
                instrument: instrument.clone(),
            });
        }

        // 3) Spread. No order on unknown market state.
        let quote = match broker.pricing(&top.candidate.instrument).await {
            Ok(q) => q,
            Err(e) => {
                warn!(instrument = %top.candidate.instrument, error = %e, "pricing query failed");
                return Err(GateDenial::SpreadUnknown);
            }
        };
        let max_spread = self.cfg.gate.max_spread;
        if quote.spread() > max_spread {
            return Err(GateDenial::SpreadTooWide {
                spread: quote.spread(),
                max: max_spread,
            });
        }

        // 4) Cooldown since the last confirmed order.
        if let Some(last) = state.last_trade_time {
            let cooldown = Duration::seconds(self.cfg.gate.cooldown_secs as i64);
            let elapsed = now - last;
            if elapsed < cooldown {
                return Err(GateDenial::CooldownActive {
                    remaining_secs: (cooldown - elapsed).num_seconds(),
                });
            }
        }

        // 5) Concurrency cap over live open trades.
        let open = match broker.open_trade_count().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "open-trades query failed");
                return Err(GateDenial::ConcurrencyUnknown);
            }
        };
        if open >= self.cfg.gate.max_concurrent_trades {
            return Err(GateDenial::ConcurrencyExhausted {
                open,
                max: self.cfg.gate.max_concurrent_trades,
            });
        }

        // 6) Existing position in this instrument. Fail-closed: a failed query
        //    denies rather than risking a duplicate entry.
        match broker.has_open_position(&top.candidate.instrument).await {
            Ok(true) => {
                return Err(GateDenial::PositionExists {
                    instrument: top.candidate.instrument.clone(),
                })
            }
            Ok(false) => {}
            Err(e) => {
                warn!(instrument = %top.candidate.instrument, error = %e, "position query failed");
                return Err(GateDenial::PositionUnknown {
                    instrument: top.candidate.instrument.clone(),
                });
            }
        }

        Ok(quote)
    }

    async fn place(
        &self,
        top: &RankedCandidate,
        seen: SeenSet,
        state: &mut GateState,
        broker: &dyn Broker,
        now: DateTime<Utc>,
        quote: &Quote,
    ) -> (SeenSet, GateOutcome) {
        let side = if top.sentiment > 0.0 { Side::Buy } else { Side::Sell };
        // The veto chain already confirmed the sizing parameters exist, but an
        // unsizeable instrument must never produce an order from here either.
        let Some(order) = build_order(&self.cfg.risk, &top.candidate.instrument, side, quote)
        else {
            let denial = GateDenial::InstrumentUnconfigured {
                instrument: top.candidate.instrument.clone(),
            };
            counter!("gate_denied_total", "reason" => denial.reason_code()).increment(1);
            warn!(instrument = %top.candidate.instrument, "sizing parameters missing, refusing order");
            return (seen, GateOutcome::Denied(denial));
        };

        info!(
            side = side.as_str(),
            instrument = %order.instrument,
            units = order.units,
            sentiment = top.sentiment,
            combined = top.combined,
            title = %crate::ingest::excerpt(&top.candidate.item.title),
            "placing market order"
        );
        counter!("gate_orders_total").increment(1);

        match broker.place_market_order(&order).await {
            Ok(OrderOutcome::Filled {
                order_id,
                fill_price,
            }) => {
                counter!("gate_fills_total").increment(1);
                // Commit point: only a confirmed order marks the headline seen.
                let seen = seen.mark_seen(top.id.clone());
                if let Err(e) = self.store.save(&seen) {
                    warn!(error = %e, "seen-store save failed; continuing with in-memory set");
                }
                state.last_trade_time = Some(now);
                (
                    seen,
                    GateOutcome::Executed {
                        side,
                        order,
                        order_id,
                        fill_price,
                    },
                )
            }
            Ok(OrderOutcome::Rejected { status, body }) => {
                warn!(status, body = %body, "order rejected; headline stays unseen");
                (seen, GateOutcome::OrderRejected { status })
            }
            Err(e) => {
                warn!(error = %e, "order placement failed; headline stays unseen");
                (seen, GateOutcome::OrderRejected { status: 0 })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk() -> RiskCfg {
        let cfg = BotConfig::from_toml_str(crate::config::TEST_TOML).unwrap();
        cfg.risk
    }

    #[test]
    fn sizing_rounds_to_nearest_ten_with_floor() {
        // 500 / (25 * 0.0001) = 200_000
        assert_eq!(units_for_risk(500.0, 25.0, 0.0001, 1000), 200_000);
        // 123 / (25 * 0.0001) = 49_200
        assert_eq!(units_for_risk(123.0, 25.0, 0.0001, 1000), 49_200);
        // tiny risk floors at min lot
        assert_eq!(units_for_risk(0.5, 25.0, 0.0001, 1000), 1000);
    }

    #[test]
    fn buy_order_enters_at_ask_with_offsets() {
        let r = risk();
        let q = Quote { bid: 1.08620, ask: 1.08640 };
        let o = build_order(&r, "EUR_USD", Side::Buy, &q).unwrap();
        assert!(o.units > 0);
        assert!((o.take_profit - (1.08640 + 38.0 * 0.0001)).abs() < 1e-9);
        assert!((o.stop_loss - (1.08640 - 25.0 * 0.0001)).abs() < 1e-9);
        assert_eq!(o.precision, 5);
    }

    #[test]
    fn sell_order_enters_at_bid_with_mirrored_offsets() {
        let r = risk();
        let q = Quote { bid: 1.08620, ask: 1.08640 };
        let o = build_order(&r, "EUR_USD", Side::Sell, &q).unwrap();
        assert!(o.units < 0);
        assert!((o.take_profit - (1.08620 - 38.0 * 0.0001)).abs() < 1e-9);
        assert!((o.stop_loss - (1.08620 + 25.0 * 0.0001)).abs() < 1e-9);
    }

    #[test]
    fn jpy_pip_size_flows_into_order() {
        let r = risk();
        let q = Quote { bid: 150.10, ask: 150.12 };
        let o = build_order(&r, "USD_JPY", Side::Buy, &q).unwrap();
        assert!((o.take_profit - (150.12 + 38.0 * 0.01)).abs() < 1e-9);
        assert_eq!(o.precision, 3);
    }

    #[test]
    fn unconfigured_instrument_builds_no_order() {
        // XAU_USD has no pip/precision entries; sizing must refuse rather than
        // apply an FX pip to a metal.
        let r = risk();
        let q = Quote { bid: 2412.20, ask: 2412.50 };
        assert!(build_order(&r, "XAU_USD", Side::Buy, &q).is_none());
    }
}
