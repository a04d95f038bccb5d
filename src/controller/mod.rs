//! View-facing controllers: list views over the query cache, forms over
//! the mutation executor.

mod form;
mod list;

pub use form::{FormController, FormState};
pub use list::{DEFAULT_PAGE_SIZE, ListViewController, Paginator};
