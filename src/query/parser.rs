//! SQL parser
//!
//! Parses the Eventide SQL dialect into the [`ast`](crate::query::ast)
//! types. Keywords are case-insensitive, `--` line comments are skipped,
//! and string literals use single quotes with `''` escaping.
//!
//! # Examples
//!
//! ```text
//! SELECT userId, event FROM events WHERE userId = 'u1'
//! SELECT * FROM events WHERE ts BETWEEN 1500 AND 3500
//! SELECT region, COUNT(*) AS c FROM events GROUP BY region ORDER BY c DESC
//! ```
//!
//! Only prefix `LIKE 'p%'` patterns are supported; any other pattern is
//! rejected at parse time as an unsupported feature.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{map, map_res, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::query::ast::*;
use crate::query::error::QueryError;

/// Parse a SQL string into a [`Statement`]
pub fn parse(sql: &str) -> Result<Statement, QueryError> {
    let cleaned = blank_comments(sql);
    let input = cleaned.as_str();

    if input.trim().is_empty() {
        return Err(QueryError::parse("empty query", 1, 1));
    }

    let result = match terminated(preceded(multispace0, select_statement), multispace0)(input) {
        Ok((remaining, select)) => {
            if remaining.is_empty() {
                Ok(Statement::Select(select))
            } else {
                let (line, column) = position(input, remaining);
                Err(QueryError::parse(
                    format!("unexpected input after statement: '{}'", remaining.trim()),
                    line,
                    column,
                ))
            }
        }
        // Failure is only raised by the LIKE pattern check below
        Err(nom::Err::Failure(e)) => {
            let (line, column) = position(input, e.input);
            Err(QueryError::parse(
                "unsupported feature: only prefix LIKE patterns ('prefix%') are supported",
                line,
                column,
            ))
        }
        Err(nom::Err::Error(e)) => {
            let (line, column) = position(input, e.input);
            Err(QueryError::parse("invalid SQL syntax", line, column))
        }
        Err(nom::Err::Incomplete(_)) => Err(QueryError::parse("incomplete query", 1, 1)),
    };
    result
}

/// Blank `--` comments to spaces so byte offsets keep pointing at the
/// original source positions. Quotes are tracked so a `--` inside a string
/// literal survives.
fn blank_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let bytes: Vec<char> = sql.chars().collect();
    let mut in_string = false;
    let mut in_comment = false;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if in_comment {
            if c == '\n' {
                in_comment = false;
                out.push('\n');
            } else {
                out.push(' ');
            }
        } else if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
        } else if c == '\'' {
            in_string = true;
            out.push(c);
        } else if c == '-' && bytes.get(i + 1) == Some(&'-') {
            in_comment = true;
            out.push_str("  ");
            i += 1;
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// Line and column (1-based) of `remaining` within `input`
fn position(input: &str, remaining: &str) -> (u32, u32) {
    let offset = input.len() - remaining.len();
    let consumed = &input[..offset];
    let line = consumed.matches('\n').count() as u32 + 1;
    let column = match consumed.rfind('\n') {
        Some(idx) => (offset - idx) as u32,
        None => offset as u32 + 1,
    };
    (line, column)
}

/// A keyword that must not run into a following identifier character
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(
        tag_no_case(kw),
        peek(not(satisfy(|c: char| c.is_alphanumeric() || c == '_'))),
    )
}

fn select_statement(input: &str) -> IResult<&str, Select> {
    let (input, _) = keyword("SELECT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, items) = select_list(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("FROM")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, table) = identifier(input)?;
    let (input, where_clause) = opt(preceded(multispace1, where_clause))(input)?;
    let (input, group_by) = opt(preceded(multispace1, group_by_clause))(input)?;
    let (input, order_by) = opt(preceded(multispace1, order_by_clause))(input)?;
    let (input, limit) = opt(preceded(multispace1, limit_clause))(input)?;

    Ok((
        input,
        Select {
            items,
            table: table.to_string(),
            where_clause,
            group_by: group_by.unwrap_or_default(),
            order_by: order_by.unwrap_or_default(),
            limit,
        },
    ))
}

fn select_list(input: &str) -> IResult<&str, Vec<SelectItem>> {
    alt((
        map(char('*'), |_| vec![SelectItem::Star]),
        separated_list1(list_comma, select_item),
    ))(input)
}

fn list_comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

fn select_item(input: &str) -> IResult<&str, SelectItem> {
    alt((aggregate_item, column_item))(input)
}

fn aggregate_item(input: &str) -> IResult<&str, SelectItem> {
    let (input, (func, column)) = aggregate_call(input)?;
    let (input, alias) = opt(alias)(input)?;
    Ok((
        input,
        SelectItem::Aggregate {
            func,
            column,
            alias,
        },
    ))
}

fn aggregate_call(input: &str) -> IResult<&str, (AggFunc, Option<String>)> {
    let (input, func) = alt((
        value(AggFunc::Count, keyword("COUNT")),
        value(AggFunc::Sum, keyword("SUM")),
        value(AggFunc::Avg, keyword("AVG")),
        value(AggFunc::Min, keyword("MIN")),
        value(AggFunc::Max, keyword("MAX")),
    ))(input)?;
    let (input, _) = delimited(multispace0, char('('), multispace0)(input)?;
    let (input, column) = if func == AggFunc::Count {
        alt((
            map(char('*'), |_| None),
            map(identifier, |c| Some(c.to_string())),
        ))(input)?
    } else {
        map(identifier, |c| Some(c.to_string()))(input)?
    };
    let (input, _) = preceded(multispace0, char(')'))(input)?;
    Ok((input, (func, column)))
}

fn column_item(input: &str) -> IResult<&str, SelectItem> {
    let (input, name) = identifier(input)?;
    let (input, alias) = opt(alias)(input)?;
    Ok((
        input,
        SelectItem::Column {
            name: name.to_string(),
            alias,
        },
    ))
}

fn alias(input: &str) -> IResult<&str, String> {
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("AS")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, name) = identifier(input)?;
    Ok((input, name.to_string()))
}

fn where_clause(input: &str) -> IResult<&str, Expr> {
    let (input, _) = keyword("WHERE")(input)?;
    let (input, _) = multispace1(input)?;
    expression(input)
}

/// `OR` binds loosest, then `AND`, then the comparison forms
fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expression(input)?;
    let (input, rest) = nom::multi::many0(preceded(
        delimited(multispace1, keyword("OR"), multispace1),
        and_expression,
    ))(input)?;

    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e))),
    ))
}

fn and_expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = nom::multi::many0(preceded(
        delimited(multispace1, keyword("AND"), multispace1),
        term,
    ))(input)?;

    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e))),
    ))
}

fn term(input: &str) -> IResult<&str, Expr> {
    alt((
        delimited(
            pair(char('('), multispace0),
            expression,
            pair(multispace0, char(')')),
        ),
        predicate,
    ))(input)
}

fn predicate(input: &str) -> IResult<&str, Expr> {
    let (input, left) = atom(input)?;
    alt((
        comparison(left.clone()),
        in_list(left.clone()),
        between(left.clone()),
        like_prefix(left),
    ))(input)
}

fn comparison(left: Expr) -> impl FnMut(&str) -> IResult<&str, Expr> {
    move |input| {
        let (input, op) = delimited(multispace0, compare_op, multispace0)(input)?;
        let (input, right) = atom(input)?;
        Ok((
            input,
            Expr::Compare {
                op,
                left: Box::new(left.clone()),
                right: Box::new(right),
            },
        ))
    }
}

fn in_list(left: Expr) -> impl FnMut(&str) -> IResult<&str, Expr> {
    move |input| {
        let (input, _) = preceded(multispace1, keyword("IN"))(input)?;
        let (input, values) = delimited(
            tuple((multispace0, char('('), multispace0)),
            separated_list1(list_comma, map(literal, Expr::Literal)),
            tuple((multispace0, char(')'))),
        )(input)?;
        Ok((
            input,
            Expr::InList {
                expr: Box::new(left.clone()),
                values,
            },
        ))
    }
}

fn between(left: Expr) -> impl FnMut(&str) -> IResult<&str, Expr> {
    move |input| {
        let (input, _) = preceded(multispace1, keyword("BETWEEN"))(input)?;
        let (input, low) = preceded(multispace1, atom)(input)?;
        let (input, _) = delimited(multispace1, keyword("AND"), multispace1)(input)?;
        let (input, high) = atom(input)?;
        Ok((
            input,
            Expr::Between {
                expr: Box::new(left.clone()),
                low: Box::new(low),
                high: Box::new(high),
            },
        ))
    }
}

fn like_prefix(left: Expr) -> impl FnMut(&str) -> IResult<&str, Expr> {
    move |input| {
        let (input, _) = preceded(multispace1, keyword("LIKE"))(input)?;
        let (input, _) = multispace1(input)?;
        let pattern_start = input;
        let (input, pattern) = string_literal(input)?;

        // Only 'prefix%' is supported; anything else is an unsupported
        // feature and must not backtrack into another parse
        let body = pattern.strip_suffix('%');
        match body {
            Some(prefix) if !prefix.contains('%') => Ok((
                input,
                Expr::LikePrefix {
                    expr: Box::new(left.clone()),
                    prefix: prefix.to_string(),
                },
            )),
            _ => Err(nom::Err::Failure(Error::new(
                pattern_start,
                ErrorKind::Verify,
            ))),
        }
    }
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ne, alt((tag("!="), tag("<>")))),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Eq, tag("=")),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    alt((
        map(literal, Expr::Literal),
        map(identifier, |c| Expr::Column(c.to_string())),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((map(string_literal, Literal::Str), number_literal))(input)
}

fn number_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    let literal = if text.contains('.') {
        text.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Float)))?
    } else {
        text.parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Digit)))?
    };
    Ok((rest, literal))
}

/// Single-quoted string with `''` escaping for an embedded quote
fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();

    loop {
        match rest.find('\'') {
            Some(idx) => {
                out.push_str(&rest[..idx]);
                rest = &rest[idx + 1..];
                if let Some(stripped) = rest.strip_prefix('\'') {
                    out.push('\'');
                    rest = stripped;
                } else {
                    return Ok((rest, out));
                }
            }
            None => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
        }
    }
}

/// Identifier: letters, digits, underscores; dotted segments allowed so
/// `props.region` addresses a property explicitly
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), identifier_segment))(input)
}

fn identifier_segment(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn group_by_clause(input: &str) -> IResult<&str, Vec<String>> {
    let (input, _) = keyword("GROUP")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("BY")(input)?;
    let (input, _) = multispace1(input)?;
    separated_list1(list_comma, map(identifier, String::from))(input)
}

fn order_by_clause(input: &str) -> IResult<&str, Vec<OrderItem>> {
    let (input, _) = keyword("ORDER")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = keyword("BY")(input)?;
    let (input, _) = multispace1(input)?;
    separated_list1(list_comma, order_item)(input)
}

fn order_item(input: &str) -> IResult<&str, OrderItem> {
    let (input, column) = identifier(input)?;
    let (input, direction) = opt(preceded(
        multispace1,
        alt((
            value(true, keyword("ASC")),
            value(false, keyword("DESC")),
        )),
    ))(input)?;

    Ok((
        input,
        OrderItem {
            column: column.to_string(),
            asc: direction.unwrap_or(true),
        },
    ))
}

fn limit_clause(input: &str) -> IResult<&str, usize> {
    let (input, _) = keyword("LIMIT")(input)?;
    let (input, _) = multispace1(input)?;
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}
