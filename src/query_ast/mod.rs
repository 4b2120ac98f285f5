//! SQL front end over document rows.
//!
//! Pipeline: [`lexer::tokenize`] -> [`parser::parse`] -> [`executor::execute`].
//! The executor only runs SELECT with INNER equi-joins, ANDed WHERE
//! predicates, GROUP BY and COUNT/SUM/AVG/MIN/MAX. INSERT/UPDATE/DELETE are
//! recognized by the parser (for validation) but rejected at execution.
//! ORDER BY, HAVING, LIMIT and OFFSET are parsed and reported, not applied.

pub mod aggregate;
pub mod ast;
pub mod errors;
pub mod executor;
pub mod join;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod store;
pub mod stores;

pub use ast::*;
pub use errors::*;
pub use executor::{execute, execute_query};
pub use lexer::{Token, tokenize};
pub use parser::{parse, parse_sql};
pub use resolver::Resolver;
pub use store::{Predicate, RowStore, SchemaCatalog};
