//! End-to-end pipeline tests against an in-memory DataPort.
//!
//! Tests cover:
//! - Assignment: alignment, splits, scale, forced pairs, overflow
//! - Simulation: universe restriction, valuation window, error paths

mod common;

use approx::assert_relative_eq;
use common::*;
use pixeltrader::domain::corporate_actions::{DividendTable, SplitTable};
use pixeltrader::domain::error::PixelTraderError;
use pixeltrader::domain::panel::ScaleSeries;
use pixeltrader::domain::pipeline::{run_assignment, run_simulation};

fn rebalance_periods() -> Vec<pixeltrader::domain::panel::Timestamp> {
    periods_from(ts(3, 14, 30), 3, 15)
}

/// AAA rises 10% a period, BBB is flat, CCC falls 10% a period.
fn trending_prices() -> MockDataPort {
    MockDataPort::new()
        .with_rebalance_prices(price_panel(
            rebalance_periods(),
            &["AAA", "BBB", "CCC"],
            vec![
                vec![100.0, 100.0, 100.0],
                vec![110.0, 100.0, 90.0],
                vec![121.0, 100.0, 81.0],
            ],
            0.0,
        ))
        .with_weights(weight_panel(
            rebalance_periods(),
            vec![vec![0.5, 0.0], vec![0.5, 0.0], vec![0.5, 0.0]],
        ))
}

mod assignment {
    use super::*;

    #[test]
    fn best_symbol_takes_the_lit_pixel() {
        let outcome = run_assignment(&trending_prices(), &pipeline_config(2, 1)).unwrap();
        assert_eq!(outcome.symbols, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(outcome.assignment.pixel(0), Some(0));
        assert_relative_eq!(outcome.utility.get(0, 0), 0.1, epsilon = 1e-12);
        assert_relative_eq!(outcome.utility.get(2, 0), -0.1, epsilon = 1e-12);
        assert_eq!(outcome.assignment.matched_count(), 2);
        let overflow: Vec<usize> = (0..3)
            .map(|j| outcome.assignment.slot(j))
            .filter(|s| *s >= 2)
            .collect();
        assert_eq!(overflow, vec![2]);
    }

    #[test]
    fn forced_pair_overrides_utility() {
        let mut config = pipeline_config(2, 1);
        config.forced = vec![("CCC".to_string(), 0), ("ZZZ".to_string(), 1)];
        let outcome = run_assignment(&trending_prices(), &config).unwrap();
        assert_eq!(outcome.assignment.slot(2), 0);
        assert_eq!(outcome.assignment.slot(0), 1);
        assert_eq!(outcome.assignment.slot(1), 2);
    }

    #[test]
    fn forced_pixel_outside_grid_fails() {
        let mut config = pipeline_config(2, 1);
        config.forced = vec![("AAA".to_string(), 2)];
        let err = run_assignment(&trending_prices(), &config).unwrap_err();
        assert!(matches!(err, PixelTraderError::ForcedPixelOutOfRange { .. }));
    }

    #[test]
    fn split_adjustment_restores_continuous_returns() {
        let mut splits = SplitTable::new();
        splits.insert("AAA", ts(3, 14, 40), 0.5).unwrap();
        let data = MockDataPort::new()
            .with_rebalance_prices(price_panel(
                rebalance_periods(),
                &["AAA", "BBB"],
                vec![vec![100.0, 100.0], vec![55.0, 100.0], vec![60.5, 100.0]],
                0.0,
            ))
            .with_weights(weight_panel(
                rebalance_periods(),
                vec![vec![0.5, 0.0], vec![0.5, 0.0], vec![0.5, 0.0]],
            ))
            .with_splits(splits);
        let outcome = run_assignment(&data, &pipeline_config(2, 1)).unwrap();
        assert_relative_eq!(outcome.utility.get(0, 0), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn scale_multiplies_gross_term() {
        let scale = ScaleSeries::new(rebalance_periods(), vec![2.0; 3]).unwrap();
        let outcome =
            run_assignment(&trending_prices().with_scale(scale), &pipeline_config(2, 1)).unwrap();
        assert_relative_eq!(outcome.utility.get(0, 0), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn scale_missing_a_period_fails() {
        let scale = ScaleSeries::new(vec![ts(3, 14, 30)], vec![2.0]).unwrap();
        let err = run_assignment(&trending_prices().with_scale(scale), &pipeline_config(2, 1))
            .unwrap_err();
        assert!(matches!(err, PixelTraderError::MisalignedPanels { .. }));
    }

    #[test]
    fn extra_frames_are_dropped_by_alignment() {
        let mut periods = vec![ts(3, 14, 15)];
        periods.extend(rebalance_periods());
        let data = trending_prices().with_weights(weight_panel(
            periods,
            vec![
                vec![0.0, 1.0],
                vec![0.5, 0.0],
                vec![0.5, 0.0],
                vec![0.5, 0.0],
            ],
        ));
        let outcome = run_assignment(&data, &pipeline_config(2, 1)).unwrap();
        assert_relative_eq!(outcome.utility.get(0, 0), 0.1, epsilon = 1e-12);
        assert_eq!(outcome.utility.get(0, 1), 0.0);
    }

    #[test]
    fn price_bar_without_a_frame_still_splits_the_return() {
        let framed = vec![ts(3, 14, 30), ts(3, 15, 0)];
        let data = trending_prices().with_weights(weight_panel(
            framed,
            vec![vec![0.5, 0.0], vec![0.5, 0.0]],
        ));
        let outcome = run_assignment(&data, &pipeline_config(2, 1)).unwrap();
        // Only the 14:45 -> 15:00 step counts, not 14:30 -> 15:00.
        assert_relative_eq!(outcome.utility.get(0, 0), 0.05, epsilon = 1e-12);
        assert_relative_eq!(outcome.utility.get(2, 0), -0.05, epsilon = 1e-12);
    }

    #[test]
    fn dividend_on_an_unframed_bar_stays_there() {
        let mut divs = DividendTable::new();
        let ex_day = ts(4, 0, 0).date_naive();
        divs.insert(ex_day, "BBB", 10.0, ex_day).unwrap();
        let data = MockDataPort::new()
            .with_rebalance_prices(price_panel(
                vec![ts(3, 14, 30), ts(4, 14, 30), ts(4, 14, 45)],
                &["AAA", "BBB"],
                vec![vec![100.0, 100.0]; 3],
                0.0,
            ))
            .with_weights(weight_panel(
                vec![ts(3, 14, 30), ts(4, 14, 45)],
                vec![vec![0.5, 0.0], vec![0.5, 0.0]],
            ))
            .with_dividends(divs);
        let outcome = run_assignment(&data, &pipeline_config(2, 1)).unwrap();
        // The ex-date's first bar is 14:30, which has no frame, so the
        // dividend never reaches a framed step.
        assert_eq!(outcome.utility.get(1, 0), 0.0);
    }

    #[test]
    fn frame_width_must_match_grid() {
        let err = run_assignment(&trending_prices(), &pipeline_config(3, 1)).unwrap_err();
        assert!(matches!(err, PixelTraderError::ShapeMismatch { .. }));
    }

    #[test]
    fn disjoint_periods_fail() {
        let data = trending_prices().with_weights(weight_panel(
            vec![ts(4, 14, 30)],
            vec![vec![0.5, 0.0]],
        ));
        let err = run_assignment(&data, &pipeline_config(2, 1)).unwrap_err();
        assert!(matches!(err, PixelTraderError::MisalignedPanels { .. }));
    }

    #[test]
    fn loader_errors_propagate() {
        let err = run_assignment(
            &trending_prices().with_error("dividends", "unreadable"),
            &pipeline_config(2, 1),
        )
        .unwrap_err();
        assert!(matches!(err, PixelTraderError::Data { .. }));
    }
}

mod simulation {
    use super::*;

    fn valuation_minutes() -> Vec<pixeltrader::domain::panel::Timestamp> {
        let mut minutes = vec![ts(2, 20, 0)];
        minutes.extend(periods_from(ts(3, 14, 30), 21, 1));
        minutes.push(ts(4, 14, 30));
        minutes
    }

    fn simulation_data() -> MockDataPort {
        let reb_periods = periods_from(ts(3, 14, 30), 2, 15);
        let val_mids: Vec<Vec<f64>> = valuation_minutes()
            .iter()
            .enumerate()
            .map(|(k, _)| vec![100.0 + (k as f64 - 1.0) * 0.1, 50.0, 10.0])
            .collect();
        MockDataPort::new()
            .with_rebalance_prices(price_panel(
                reb_periods.clone(),
                &["AAA", "BBB", "CCC"],
                vec![vec![100.0, 50.0, 10.0], vec![101.5, 50.0, 10.0]],
                0.0,
            ))
            .with_valuation_prices(price_panel(
                valuation_minutes(),
                &["AAA", "BBB", "CCC"],
                val_mids,
                0.0,
            ))
            .with_weights(weight_panel(reb_periods, vec![vec![1.0, 0.0], vec![1.0, 0.0]]))
            .with_assignment(&[("AAA", 0), ("BBB", 1), ("CCC", 2)])
    }

    #[test]
    fn universe_and_window_are_restricted() {
        let result = run_simulation(&simulation_data(), &pipeline_config(2, 1)).unwrap();
        assert_eq!(result.symbols, vec!["AAA", "BBB"]);
        assert_eq!(result.nav_history.len(), 21);
        assert_eq!(result.nav_history[0].period, ts(3, 14, 30));
        assert_eq!(result.nav_history[20].period, ts(3, 14, 50));
        assert_eq!(result.rebalance_history.len(), 2);
        assert_eq!(result.shares_history.cols(), 2);
    }

    #[test]
    fn buy_and_hold_tracks_the_price() {
        let result = run_simulation(&simulation_data(), &pipeline_config(2, 1)).unwrap();
        assert_relative_eq!(result.shares_history.get(0, 0), 10_000.0, epsilon = 1e-6);
        assert_relative_eq!(result.final_nav().unwrap(), 1_020_000.0, epsilon = 1e-3);
        assert_relative_eq!(result.total_return().unwrap(), 0.02, epsilon = 1e-9);
        for rec in &result.nav_history {
            assert_relative_eq!(
                rec.nav,
                rec.cash + rec.positions + rec.pending_dividends,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn dividends_reach_the_simulator() {
        let mut divs = DividendTable::new();
        let day = ts(3, 0, 0).date_naive();
        let pay = ts(20, 0, 0).date_naive();
        divs.insert(day, "AAA", 1.0, pay).unwrap();
        let result = run_simulation(
            &simulation_data().with_dividends(divs),
            &pipeline_config(2, 1),
        )
        .unwrap();
        // Accrual happens at the first minute of the day, before the first
        // rebalance buys anything.
        assert!(result.nav_history.iter().all(|r| r.pending_dividends == 0.0));
    }

    #[test]
    fn symbol_absent_from_valuation_is_valued_at_zero() {
        let minutes = valuation_minutes();
        let rows = minutes.len();
        let data = simulation_data().with_valuation_prices(price_panel(
            minutes,
            &["AAA", "CCC"],
            vec![vec![100.0, 10.0]; rows],
            0.0,
        ));
        let result = run_simulation(&data, &pipeline_config(2, 1)).unwrap();
        assert_eq!(result.symbols, vec!["AAA", "BBB"]);
        assert!(result.values_history.column(1).iter().all(|v| *v == 0.0));
        assert_relative_eq!(result.final_nav().unwrap(), 1_000_000.0, epsilon = 1e-6);
    }

    #[test]
    fn valuation_gap_is_forward_filled() {
        let mut mids: Vec<Vec<f64>> = valuation_minutes()
            .iter()
            .map(|_| vec![100.0, 50.0, 10.0])
            .collect();
        // No AAA quote on the last simulated minute.
        mids[21][0] = f64::NAN;
        let data = simulation_data().with_valuation_prices(price_panel(
            valuation_minutes(),
            &["AAA", "BBB", "CCC"],
            mids,
            0.0,
        ));
        let result = run_simulation(&data, &pipeline_config(2, 1)).unwrap();
        assert_relative_eq!(result.final_nav().unwrap(), 1_000_000.0, epsilon = 1e-6);
    }

    #[test]
    fn rebalance_minute_missing_from_valuation_fails() {
        let minutes: Vec<_> = valuation_minutes()
            .into_iter()
            .filter(|m| *m != ts(3, 14, 45))
            .collect();
        let rows = minutes.len();
        let data = simulation_data().with_valuation_prices(price_panel(
            minutes,
            &["AAA", "BBB", "CCC"],
            vec![vec![100.0, 50.0, 10.0]; rows],
            0.0,
        ));
        let err = run_simulation(&data, &pipeline_config(2, 1)).unwrap_err();
        assert!(matches!(err, PixelTraderError::MisalignedPanels { .. }));
    }

    #[test]
    fn non_positive_capital_fails() {
        let mut config = pipeline_config(2, 1);
        config.deployed_capital = 0.0;
        let err = run_simulation(&simulation_data(), &config).unwrap_err();
        assert!(matches!(err, PixelTraderError::NonPositiveCapital { .. }));
    }

    #[test]
    fn unreadable_assignment_fails() {
        let err = run_simulation(
            &simulation_data().with_error("assignment", "missing file"),
            &pipeline_config(2, 1),
        )
        .unwrap_err();
        assert!(matches!(err, PixelTraderError::Data { .. }));
    }
}
