// src/views.rs
//! HTML pages. Numbers are formatted here and nowhere else.

use crate::models::{CurrencyStats, DayStats, TradePair, Transaction};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt::Write;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Two decimal display used for balances and P&L figures.
pub fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #ccc;padding:4px 8px;text-align:right}}</style>\n\
         </head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

pub fn index(
    trades: &[TradePair],
    blotter: &[Transaction],
    pl: &BTreeMap<String, CurrencyStats>,
) -> String {
    let mut body = String::from("<h1>Portfolio</h1>\n<h2>Trade</h2>\n<ul>\n");
    for t in trades {
        let _ = writeln!(
            body,
            "<li><a href=\"/trade?cur1={c1}&amp;cur2={c2}\">{c1} &rarr; {c2}</a></li>",
            c1 = escape(&t.cur1),
            c2 = escape(&t.cur2)
        );
    }
    body.push_str("</ul>\n<h2>Blotter</h2>\n<table>\n<tr><th>Date</th><th>From</th><th>To</th>\
                   <th>Rate</th><th>Out</th><th>In</th><th>Cash</th><th>USD sum</th></tr>\n");
    for ts in blotter {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            ts.date.format("%Y-%m-%d %H:%M:%S"),
            escape(&ts.from),
            escape(&ts.to),
            ts.rate.normalize(),
            ts.out.normalize(),
            ts.amount_in.normalize(),
            money(ts.cash),
            money(ts.usd_sum)
        );
    }
    body.push_str("</table>\n<h2>P&amp;L</h2>\n<table>\n<tr><th>Currency</th><th>Qty</th><th>Market</th>\
                   <th>WAP</th><th>UPL</th><th>RPL</th><th>Total P&amp;L</th>\
                   <th>Allocation (shares %)</th><th>Allocation (dollars %)</th></tr>\n");
    for (currency, s) in pl {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(currency),
            money(s.qty),
            money(s.last_price),
            money(s.wap),
            money(s.upl),
            money(s.rpl),
            money(s.total_pl),
            money(s.allocation_by_shares),
            money(s.allocation_by_dollars)
        );
    }
    body.push_str("</table>\n");
    page("Portfolio", &body)
}

pub fn trade(cur1: &str, cur2: &str, price: Decimal, stat: &DayStats, history_img: &str, moving_img: &str) -> String {
    let (c1, c2) = (escape(cur1), escape(cur2));
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{} &rarr; {}</h1>", c1, c2);
    let _ = writeln!(body, "<p>Price: 1 {} = {} {}</p>", c2, price.normalize(), c1);
    body.push_str("<table>\n");
    for (label, value) in [
        ("Max (24h)", stat.high),
        ("Min (24h)", stat.low),
        ("Average (24h)", stat.average),
        ("Standard deviation (24h)", stat.std_dev),
    ] {
        let _ = writeln!(body, "<tr><th>{}</th><td>{:.6}</td></tr>", label, value);
    }
    body.push_str("</table>\n");
    let _ = writeln!(
        body,
        "<form action=\"/deal\" method=\"get\">\n<input type=\"hidden\" name=\"cur1\" value=\"{c1}\">\n\
         <input type=\"hidden\" name=\"cur2\" value=\"{c2}\">\n\
         <label>Quantity of {c2}: <input type=\"text\" name=\"qty\"></label>\n\
         <button type=\"submit\">Buy</button>\n</form>",
        c1 = c1,
        c2 = c2
    );
    let _ = writeln!(body, "<img src=\"/img/{}\" alt=\"100 days history\">", escape(history_img));
    let _ = writeln!(body, "<img src=\"/img/{}\" alt=\"20 days moving average\">", escape(moving_img));
    body.push_str("<p><a href=\"/\">Back to portfolio</a></p>\n");
    page(&format!("Trade {} for {}", cur1, cur2), &body)
}

pub fn deal(text: &str, cur1: &str, cur2: &str) -> String {
    let body = format!(
        "<h1>{c1} &rarr; {c2}</h1>\n<p>{}</p>\n\
         <p><a href=\"/trade?cur1={c1}&amp;cur2={c2}\">Trade again</a> | <a href=\"/\">Back to portfolio</a></p>\n",
        escape(text),
        c1 = escape(cur1),
        c2 = escape(cur2)
    );
    page("Deal", &body)
}

pub fn error(status: u16, message: &str) -> String {
    let body = format!(
        "<h1>Error {}</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to portfolio</a></p>\n",
        status,
        escape(message)
    );
    page("Error", &body)
}
