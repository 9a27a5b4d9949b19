use std::sync::Arc;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::{many0, many1};
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};

use crate::core::error::{Error, Result};
use crate::plan::Schema;
use crate::search::query::{BooleanQuery, LeafQuery, Occur, Query};

/// Turns query strings into the Query AST: `field:term`, quoted phrases,
/// `AND`/`OR`/`NOT`, `+`/`-` clause prefixes and parentheses. Parsed
/// leaves are then expanded against the schema, running each leaf's text
/// through the target field's analyzer.
pub struct QueryParser {
    schema: Arc<Schema>,
    default_fields: Vec<String>,
}

impl QueryParser {
    pub fn new(schema: Arc<Schema>) -> Self {
        let default_fields = schema.default_search_fields();
        QueryParser {
            schema,
            default_fields,
        }
    }

    pub fn with_fields(schema: Arc<Schema>, fields: Vec<String>) -> Self {
        QueryParser {
            schema,
            default_fields: fields,
        }
    }

    /// Parse and expand in one step.
    pub fn parse(&self, text: &str) -> Result<Query> {
        self.expand(self.tree(text)?)
    }

    /// The raw syntax tree, leaves unexpanded.
    pub fn tree(&self, text: &str) -> Result<Query> {
        if text.trim().is_empty() {
            return Ok(Query::no_match());
        }
        match all_consuming(delimited(multispace0, or_expr, multispace0)).parse(text) {
            Ok((_, query)) => Ok(query),
            Err(_) => Err(Error::bad_argument(format!(
                "Couldn't parse query '{}'",
                text
            ))),
        }
    }

    /// Resolve leaf stubs: analyze the text with each target field's
    /// analyzer and build term/phrase queries over the default fields.
    pub fn expand(&self, query: Query) -> Result<Query> {
        Ok(match query {
            Query::Leaf(leaf) => self.expand_leaf(&leaf)?,
            Query::And(mut q) => {
                q.children = q
                    .children
                    .into_iter()
                    .map(|child| self.expand(child))
                    .collect::<Result<_>>()?;
                Query::And(q)
            }
            Query::Or(mut q) => {
                q.children = q
                    .children
                    .into_iter()
                    .map(|child| self.expand(child))
                    .collect::<Result<_>>()?;
                Query::Or(q)
            }
            Query::Not(mut q) => {
                *q.negand = self.expand(*q.negand)?;
                Query::Not(q)
            }
            Query::Boolean(mut q) => {
                q.clauses = q
                    .clauses
                    .into_iter()
                    .map(|(occur, child)| self.expand(child).map(|child| (occur, child)))
                    .collect::<Result<_>>()?;
                Query::Boolean(q)
            }
            Query::ReqOpt(mut q) => {
                *q.required = self.expand(*q.required)?;
                *q.optional = self.expand(*q.optional)?;
                Query::ReqOpt(q)
            }
            other => other,
        })
    }

    fn expand_leaf(&self, leaf: &LeafQuery) -> Result<Query> {
        let fields: Vec<String> = match &leaf.field {
            Some(field) => vec![field.clone()],
            None => self.default_fields.clone(),
        };
        if fields.is_empty() {
            return Ok(Query::no_match());
        }

        let mut per_field = Vec::with_capacity(fields.len());
        for field in &fields {
            let terms = match self.schema.fetch_analyzer(field) {
                Some(analyzer) => analyzer.split(&leaf.text)?,
                // Non-analyzed fields take the text verbatim.
                None => vec![leaf.text.clone()],
            };
            let mut query = match terms.len() {
                0 => Query::no_match(),
                1 => Query::term(field, &terms[0]),
                _ => Query::Phrase(crate::search::query::PhraseQuery {
                    field: field.clone(),
                    terms,
                    boost: 1.0,
                }),
            };
            query.set_boost(leaf.boost);
            per_field.push(query);
        }

        Ok(if per_field.len() == 1 {
            per_field.pop().expect("one field")
        } else {
            Query::or(per_field)
        })
    }
}

const RESERVED: [&str; 3] = ["AND", "OR", "NOT"];

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    delimited(multispace1, tag(word), multispace1)
}

fn or_expr(input: &str) -> IResult<&str, Query> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(keyword("OR"), and_expr)).parse(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    let mut children = vec![first];
    children.extend(rest);
    Ok((input, Query::or(children)))
}

fn and_expr(input: &str) -> IResult<&str, Query> {
    let (input, first) = group(input)?;
    let (input, rest) = many0(preceded(keyword("AND"), group)).parse(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    let mut children = vec![first];
    children.extend(rest);
    Ok((input, Query::and(children)))
}

/// Whitespace-separated clauses combine as a boolean: bare clauses are
/// SHOULD, `+` marks MUST, `-` marks MUST_NOT.
fn group(input: &str) -> IResult<&str, Query> {
    let (input, clauses) = many1(preceded(multispace0, clause)).parse(input)?;
    if clauses.len() == 1 && clauses[0].0 == Occur::Should {
        let (_, query) = clauses.into_iter().next().expect("one clause");
        return Ok((input, query));
    }
    let mut bool_query = BooleanQuery::new();
    for (occur, query) in clauses {
        bool_query.add(occur, query);
    }
    Ok((input, Query::Boolean(bool_query)))
}

fn clause(input: &str) -> IResult<&str, (Occur, Query)> {
    let (input, prefix) = opt(alt((char('+'), char('-')))).parse(input)?;
    let (input, query) = unit(input)?;
    let occur = match prefix {
        Some('+') => Occur::Must,
        Some('-') => Occur::MustNot,
        _ => Occur::Should,
    };
    Ok((input, (occur, query)))
}

fn unit(input: &str) -> IResult<&str, Query> {
    alt((not_unit, parens, leaf)).parse(input)
}

fn not_unit(input: &str) -> IResult<&str, Query> {
    let (input, _) = terminated(tag("NOT"), multispace1).parse(input)?;
    let (input, negand) = unit(input)?;
    Ok((input, Query::not(negand)))
}

fn parens(input: &str) -> IResult<&str, Query> {
    delimited(
        char('('),
        delimited(multispace0, or_expr, multispace0),
        char(')'),
    )
    .parse(input)
}

fn leaf(input: &str) -> IResult<&str, Query> {
    let (input, field) = opt(terminated(field_name, char(':'))).parse(input)?;
    let (input, (text, quoted)) = alt((
        map(quoted_text, |text: &str| (text, true)),
        map(bare_term, |text: &str| (text, false)),
    ))
    .parse(input)?;
    Ok((
        input,
        Query::Leaf(LeafQuery {
            field: field.map(str::to_string),
            text: text.to_string(),
            quoted,
            boost: 1.0,
        }),
    ))
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.').parse(input)
}

fn quoted_text(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c| c != '"'), char('"')).parse(input)
}

fn bare_term(input: &str) -> IResult<&str, &str> {
    let (rest, term) =
        take_while1(|c: char| !c.is_whitespace() && !"()\":".contains(c)).parse(input)?;
    if RESERVED.contains(&term) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    Ok((rest, term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FieldType;

    fn parser() -> QueryParser {
        let mut schema = Schema::new();
        schema.spec_field("title", FieldType::plain_text()).unwrap();
        schema
            .spec_field("content", FieldType::plain_text())
            .unwrap();
        QueryParser::new(Arc::new(schema))
    }

    #[test]
    fn field_term_phrase_and_negation() {
        let parser = parser();
        let tree = parser.tree(r#"title:foo "bar baz" -qux"#).unwrap();

        let Query::Boolean(bool_query) = tree else {
            panic!("expected boolean group, got {:?}", tree);
        };
        assert_eq!(bool_query.clauses.len(), 3);

        let (occur, first) = &bool_query.clauses[0];
        assert_eq!(*occur, Occur::Should);
        assert_eq!(
            *first,
            Query::Leaf(LeafQuery {
                field: Some("title".to_string()),
                text: "foo".to_string(),
                quoted: false,
                boost: 1.0,
            })
        );

        let (occur, second) = &bool_query.clauses[1];
        assert_eq!(*occur, Occur::Should);
        assert!(matches!(second, Query::Leaf(leaf) if leaf.quoted && leaf.text == "bar baz"));

        let (occur, third) = &bool_query.clauses[2];
        assert_eq!(*occur, Occur::MustNot);
        assert!(matches!(third, Query::Leaf(leaf) if leaf.text == "qux"));
    }

    #[test]
    fn and_or_precedence() {
        let parser = parser();
        let tree = parser.tree("ut OR laborum AND lorem").unwrap();
        let Query::Or(or) = tree else {
            panic!("OR should be outermost");
        };
        assert_eq!(or.children.len(), 2);
        assert!(matches!(&or.children[1], Query::And(and) if and.children.len() == 2));
    }

    #[test]
    fn parens_override_precedence() {
        let parser = parser();
        let tree = parser.tree("(ut OR laborum) AND lorem").unwrap();
        let Query::And(and) = tree else {
            panic!("AND should be outermost");
        };
        assert!(matches!(&and.children[0], Query::Or(_)));
    }

    #[test]
    fn leaves_expand_through_analyzers() {
        let parser = parser();
        let query = parser.parse("content:Ullamco").unwrap();
        assert_eq!(query, Query::term("content", "ullamco"));

        // Default fields fan out as an OR.
        let query = parser.parse("Ullamco").unwrap();
        let Query::Or(or) = query else {
            panic!("expected OR over default fields");
        };
        assert_eq!(
            or.children,
            vec![
                Query::term("title", "ullamco"),
                Query::term("content", "ullamco"),
            ]
        );
    }

    #[test]
    fn quoted_leaf_expands_to_phrase() {
        let parser = parser();
        let query = parser.parse(r#"content:"Fugiat Nulla""#).unwrap();
        assert_eq!(query, Query::phrase("content", &["fugiat", "nulla"]));
    }

    #[test]
    fn not_prefix_parses() {
        let parser = parser();
        let tree = parser.tree("NOT content:lorem").unwrap();
        assert!(matches!(tree, Query::Not(_)));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let parser = parser();
        assert_eq!(parser.tree("   ").unwrap(), Query::no_match());
        assert!(parser.tree("((").is_err());
    }
}
