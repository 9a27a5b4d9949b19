/// User-facing query AST. Every variant carries a boost that scales its
/// contribution to the final score.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term(TermQuery),
    Phrase(PhraseQuery),
    Boolean(BooleanQuery),
    And(AndQuery),
    Or(OrQuery),
    Not(NotQuery),
    MatchAll(MatchAllQuery),
    NoMatch(NoMatchQuery),
    Range(RangeQuery),
    /// Required clause gates matching; the optional clause only sweetens
    /// scores where it coincides.
    ReqOpt(ReqOptQuery),
    /// Parsed-syntax stub: field/text pending schema-aware expansion.
    Leaf(LeafQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReqOptQuery {
    pub required: Box<Query>,
    pub optional: Box<Query>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    pub field: String,
    pub term: String,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhraseQuery {
    pub field: String,
    pub terms: Vec<String>,
    pub boost: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanQuery {
    pub clauses: Vec<(Occur, Query)>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AndQuery {
    pub children: Vec<Query>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrQuery {
    pub children: Vec<Query>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotQuery {
    pub negand: Box<Query>,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchAllQuery {
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoMatchQuery {
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub field: String,
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub include_lower: bool,
    pub include_upper: bool,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafQuery {
    pub field: Option<String>,
    pub text: String,
    pub quoted: bool,
    pub boost: f32,
}

impl Query {
    pub fn term(field: &str, term: &str) -> Query {
        Query::Term(TermQuery {
            field: field.to_string(),
            term: term.to_string(),
            boost: 1.0,
        })
    }

    pub fn phrase(field: &str, terms: &[&str]) -> Query {
        Query::Phrase(PhraseQuery {
            field: field.to_string(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            boost: 1.0,
        })
    }

    pub fn and(children: Vec<Query>) -> Query {
        Query::And(AndQuery {
            children,
            boost: 1.0,
        })
    }

    pub fn or(children: Vec<Query>) -> Query {
        Query::Or(OrQuery {
            children,
            boost: 1.0,
        })
    }

    pub fn not(negand: Query) -> Query {
        Query::Not(NotQuery {
            negand: Box::new(negand),
            boost: 1.0,
        })
    }

    pub fn match_all() -> Query {
        Query::MatchAll(MatchAllQuery { boost: 1.0 })
    }

    pub fn no_match() -> Query {
        Query::NoMatch(NoMatchQuery { boost: 1.0 })
    }

    pub fn range(
        field: &str,
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
    ) -> Query {
        Query::Range(RangeQuery {
            field: field.to_string(),
            lower: lower.map(str::to_string),
            upper: upper.map(str::to_string),
            include_lower,
            include_upper,
            boost: 1.0,
        })
    }

    pub fn boost(&self) -> f32 {
        match self {
            Query::Term(q) => q.boost,
            Query::Phrase(q) => q.boost,
            Query::Boolean(q) => q.boost,
            Query::And(q) => q.boost,
            Query::Or(q) => q.boost,
            Query::Not(q) => q.boost,
            Query::MatchAll(q) => q.boost,
            Query::NoMatch(q) => q.boost,
            Query::Range(q) => q.boost,
            Query::ReqOpt(q) => q.boost,
            Query::Leaf(q) => q.boost,
        }
    }

    pub fn set_boost(&mut self, boost: f32) {
        match self {
            Query::Term(q) => q.boost = boost,
            Query::Phrase(q) => q.boost = boost,
            Query::Boolean(q) => q.boost = boost,
            Query::And(q) => q.boost = boost,
            Query::Or(q) => q.boost = boost,
            Query::Not(q) => q.boost = boost,
            Query::MatchAll(q) => q.boost = boost,
            Query::NoMatch(q) => q.boost = boost,
            Query::Range(q) => q.boost = boost,
            Query::ReqOpt(q) => q.boost = boost,
            Query::Leaf(q) => q.boost = boost,
        }
    }
}

impl BooleanQuery {
    pub fn new() -> Self {
        BooleanQuery {
            clauses: Vec::new(),
            boost: 1.0,
        }
    }

    pub fn add(&mut self, occur: Occur, query: Query) -> &mut Self {
        self.clauses.push((occur, query));
        self
    }

    /// Rewrite MUST/SHOULD/MUST_NOT clauses into the AND/OR/NOT core the
    /// compiler executes directly.
    pub fn rewrite(&self) -> Query {
        let musts: Vec<Query> = self
            .clauses
            .iter()
            .filter(|(occur, _)| *occur == Occur::Must)
            .map(|(_, q)| q.clone())
            .collect();
        let shoulds: Vec<Query> = self
            .clauses
            .iter()
            .filter(|(occur, _)| *occur == Occur::Should)
            .map(|(_, q)| q.clone())
            .collect();
        let must_nots: Vec<Query> = self
            .clauses
            .iter()
            .filter(|(occur, _)| *occur == Occur::MustNot)
            .map(|(_, q)| q.clone())
            .collect();

        let mut core = if musts.is_empty() {
            match shoulds.len() {
                0 => Query::no_match(),
                1 => shoulds.into_iter().next().unwrap(),
                _ => Query::or(shoulds),
            }
        } else {
            let required = if musts.len() == 1 {
                musts.into_iter().next().unwrap()
            } else {
                Query::and(musts)
            };
            if shoulds.is_empty() {
                required
            } else {
                let optional = if shoulds.len() == 1 {
                    shoulds.into_iter().next().unwrap()
                } else {
                    Query::or(shoulds)
                };
                Query::ReqOpt(ReqOptQuery {
                    required: Box::new(required),
                    optional: Box::new(optional),
                    boost: 1.0,
                })
            }
        };

        if !must_nots.is_empty() {
            let mut children = match core {
                Query::And(and) => and.children,
                other => vec![other],
            };
            for negand in must_nots {
                children.push(Query::not(negand));
            }
            core = Query::and(children);
        }

        if let Some(boosted) = match &mut core {
            Query::NoMatch(_) => None,
            other => Some(other),
        } {
            let combined = self.boost * boosted.boost();
            boosted.set_boost(combined);
        }
        core
    }
}

impl Default for BooleanQuery {
    fn default() -> Self {
        BooleanQuery::new()
    }
}
