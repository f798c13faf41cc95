// ========================================
// 算術式パーサー
// ========================================
//
// 状態パスを数値に置き換えた後の文字列（数字・空白・四則演算・括弧のみ）を評価する。

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "parser/arith.pest"]
pub struct ArithParser;

/// 算術式を評価する。構文エラーはメッセージ付きで返す
pub fn evaluate_arithmetic(source: &str) -> Result<f64, String> {
    let mut pairs = ArithParser::parse(Rule::calculation, source).map_err(|e| e.to_string())?;
    let calculation = pairs.next().ok_or("empty expression")?;
    let sum = calculation
        .into_inner()
        .find(|p| p.as_rule() == Rule::sum)
        .ok_or("missing expression body")?;
    eval_sum(sum)
}

fn eval_sum(pair: Pair<Rule>) -> Result<f64, String> {
    let mut inner = pair.into_inner();
    let mut acc = eval_product(inner.next().ok_or("missing operand")?)?;
    while let Some(op) = inner.next() {
        let rhs = eval_product(inner.next().ok_or("missing right operand")?)?;
        match op.as_str() {
            "+" => acc += rhs,
            "-" => acc -= rhs,
            other => return Err(format!("unexpected operator '{}'", other)),
        }
    }
    Ok(acc)
}

fn eval_product(pair: Pair<Rule>) -> Result<f64, String> {
    let mut inner = pair.into_inner();
    let mut acc = eval_unary(inner.next().ok_or("missing operand")?)?;
    while let Some(op) = inner.next() {
        let rhs = eval_unary(inner.next().ok_or("missing right operand")?)?;
        match op.as_str() {
            "*" => acc *= rhs,
            "/" => acc /= rhs,
            other => return Err(format!("unexpected operator '{}'", other)),
        }
    }
    Ok(acc)
}

fn eval_unary(pair: Pair<Rule>) -> Result<f64, String> {
    let mut negate = false;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::sign => negate ^= p.as_str() == "-",
            Rule::number => {
                let n: f64 = p.as_str().parse().map_err(|e| format!("{}: {}", p.as_str(), e))?;
                return Ok(if negate { -n } else { n });
            }
            Rule::sum => {
                let n = eval_sum(p)?;
                return Ok(if negate { -n } else { n });
            }
            other => return Err(format!("unexpected token {:?}", other)),
        }
    }
    Err("missing operand".to_string())
}
