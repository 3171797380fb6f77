use serde_json::json;

use crate::engine::years_covered;
use crate::models::*;

/// Generate a structured tear sheet as a JSON value combining the run summary,
/// per-window diagnostics and monthly returns.
pub fn generate_tear_sheet(result: &WalkForwardResult) -> serde_json::Value {
    let period = match (result.daily.first(), result.daily.last()) {
        (Some(first), Some(last)) => format!("{} to {}", first.date, last.date),
        _ => String::new(),
    };

    let mut sheet = json!({
        "summary": {
            "allocator": result.allocator,
            "strategies": result.strategy_ids,
            "period": period,
            "years": years_covered(result.daily.len()),
            "initial_capital": result.initial_capital,
            "final_equity": result.final_equity,
            "total_return_percent": result.metrics.total_return_pct,
            "cagr_percent": result.metrics.cagr_pct,
            "windows": result.windows.len(),
            "fallback_windows": result.fallback_windows,
        },
        "risk_metrics": {
            "sharpe_ratio": result.metrics.sharpe_ratio,
            "max_drawdown_percent": result.metrics.max_drawdown_pct,
            "annual_volatility_percent": result.metrics.annual_volatility_pct,
            "peak_margin_percent": result.peak_margin_pct,
            "hard_stop_days": result.hard_stop_days,
        },
        "overfitting": {
            "avg_in_sample_cagr_percent": result.avg_in_sample_cagr_pct,
            "avg_out_of_sample_cagr_percent": result.avg_out_of_sample_cagr_pct,
            "ratio": result.overfitting_ratio,
        },
    });

    let windows: Vec<serde_json::Value> = result
        .windows
        .iter()
        .map(|w| {
            json!({
                "window": w.bounds.index,
                "train": format!("{} to {}", w.train_start_date, w.train_end_date),
                "test": format!("{} to {}", w.test_start_date, w.test_end_date),
                "status": w.status.label(),
                "allocations": w.final_allocations,
                "margin_scale": w.margin_scale,
                "drawdown_scale": w.drawdown_scale,
                "hard_stop_days": w.hard_stop_days,
                "in_sample_cagr_percent": w.in_sample.cagr_pct,
                "out_of_sample_cagr_percent": w.out_of_sample.cagr_pct,
                "out_of_sample_sharpe": w.out_of_sample.sharpe_ratio,
                "out_of_sample_max_drawdown_percent": w.out_of_sample.max_drawdown_pct,
            })
        })
        .collect();
    sheet["windows"] = json!(windows);

    if !result.monthly_returns.is_empty() {
        sheet["monthly_returns"] = json!(result
            .monthly_returns
            .iter()
            .map(|m| json!({
                "month": format!("{}-{:02}", m.year, m.month),
                "return_percent": m.return_pct,
            }))
            .collect::<Vec<_>>());
    }

    sheet
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
    table{border-collapse:collapse;margin-bottom:2em}\
    th,td{border:1px solid #ccc;padding:4px 8px;text-align:right}\
    th{background:#f0f0f0}.neg{color:#b00}";

/// Static HTML page with the summary, window and monthly tables.
pub fn render_tear_sheet_html(result: &WalkForwardResult, run_name: &str) -> String {
    let title = escape(run_name);
    let mut html = String::new();
    html.push_str(&format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title>\
         <style>{}</style></head><body>\n<h1>{}</h1>\n",
        title, STYLE, title
    ));

    html.push_str("<h2>Summary</h2>\n<table>\n");
    let m = &result.metrics;
    let rows = [
        ("Allocator", escape(&result.allocator)),
        ("Strategies", escape(&result.strategy_ids.join(", "))),
        ("Initial capital", format!("{:.2}", result.initial_capital)),
        ("Final equity", format!("{:.2}", result.final_equity)),
        ("Total return", pct(m.total_return_pct)),
        ("CAGR", pct(m.cagr_pct)),
        ("Sharpe", format!("{:.2}", m.sharpe_ratio)),
        ("Max drawdown", pct(m.max_drawdown_pct)),
        ("Annual volatility", pct(m.annual_volatility_pct)),
        ("Peak margin", pct(result.peak_margin_pct)),
        ("Avg in-sample CAGR", pct(result.avg_in_sample_cagr_pct)),
        ("Avg out-of-sample CAGR", pct(result.avg_out_of_sample_cagr_pct)),
        (
            "Overfitting ratio",
            result
                .overfitting_ratio
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "n/a".to_string()),
        ),
        ("Hard-stop days", result.hard_stop_days.to_string()),
        ("Fallback windows", result.fallback_windows.to_string()),
    ];
    for (label, value) in rows {
        html.push_str(&format!("<tr><th>{}</th><td>{}</td></tr>\n", label, value));
    }
    html.push_str("</table>\n");

    html.push_str(
        "<h2>Windows</h2>\n<table>\n<tr><th>#</th><th>Test period</th><th>Status</th>\
         <th>Allocations</th><th>Margin scale</th><th>DD scale</th><th>IS CAGR</th>\
         <th>OOS CAGR</th><th>OOS Sharpe</th><th>OOS MaxDD</th></tr>\n",
    );
    for w in &result.windows {
        let allocations = w
            .final_allocations
            .iter()
            .map(|(id, pct)| format!("{} {:.1}%", escape(id), pct))
            .collect::<Vec<_>>()
            .join(", ");
        html.push_str(&format!(
            "<tr><td>{}</td><td>{} to {}</td><td>{}</td><td>{}</td><td>{:.3}</td><td>{:.3}</td>\
             <td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>\n",
            w.bounds.index,
            w.test_start_date,
            w.test_end_date,
            w.status.label(),
            allocations,
            w.margin_scale,
            w.drawdown_scale,
            pct(w.in_sample.cagr_pct),
            pct(w.out_of_sample.cagr_pct),
            w.out_of_sample.sharpe_ratio,
            pct(w.out_of_sample.max_drawdown_pct),
        ));
    }
    html.push_str("</table>\n");

    if !result.monthly_returns.is_empty() {
        html.push_str(
            "<h2>Monthly returns</h2>\n<table>\n<tr><th>Month</th><th>Return</th></tr>\n",
        );
        for mr in &result.monthly_returns {
            html.push_str(&format!(
                "<tr><td>{}-{:02}</td><td>{}</td></tr>\n",
                mr.year,
                mr.month,
                pct(mr.return_pct)
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body></html>\n");
    html
}

fn pct(value: f64) -> String {
    if value < 0.0 {
        format!("<span class=\"neg\">{:.2}%</span>", value)
    } else {
        format!("{:.2}%", value)
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
