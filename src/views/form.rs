use tokio::sync::watch;
use tracing::debug;

use crate::error::Error;
use crate::errors::ValidationError;
use crate::mutation::{Mutation, MutationEntry};
use crate::validate::Validate;

/// Controller of a form submitting a mutation
///
/// The form owns the field values. Submitting validates them first: on
/// failure the field errors are kept for display and nothing is sent.
pub struct Form<I, O> {
    values: watch::Sender<I>,
    errors: watch::Sender<Option<ValidationError>>,
    mutation: Mutation<I, O>,
}

impl<I, O> Form<I, O>
where
    I: Validate + Default + Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new(mutation: Mutation<I, O>) -> Self {
        let (values, _) = watch::channel(I::default());
        let (errors, _) = watch::channel(None);
        Self {
            values,
            errors,
            mutation,
        }
    }

    /// Current field values
    pub fn values(&self) -> I {
        self.values.borrow().clone()
    }

    /// Change the field values
    pub fn edit<F: FnOnce(&mut I)>(&self, change: F) {
        self.values.send_modify(change);
    }

    /// Replace every field value
    pub fn fill(&self, values: I) {
        self.values.send_replace(values);
    }

    pub fn subscribe(&self) -> watch::Receiver<I> {
        self.values.subscribe()
    }

    /// Errors of the last submission, if it failed validation
    pub fn errors(&self) -> Option<ValidationError> {
        self.errors.borrow().clone()
    }

    /// Error message of a single field
    pub fn field_error(&self, field: &str) -> Option<String> {
        self.errors
            .borrow()
            .as_ref()
            .and_then(|errors| errors.get(field).map(str::to_string))
    }

    /// State of the underlying mutation
    pub fn entry(&self) -> MutationEntry<O> {
        self.mutation.entry()
    }

    pub fn mutation(&self) -> &Mutation<I, O> {
        &self.mutation
    }

    /// Validate the values and submit them
    pub async fn submit(&self) -> Result<O, Error> {
        let values = self.values();
        if let Err(errors) = values.validate() {
            debug!(form = %self.mutation.id(), "{errors}");
            self.errors.send_replace(Some(errors.clone()));
            return Err(errors.into());
        }
        self.errors.send_replace(None);
        self.mutation.run(values).await
    }

    /// Back to empty values, no errors and an idle mutation
    pub fn reset(&self) {
        self.values.send_replace(I::default());
        self.errors.send_replace(None);
        self.mutation.reset();
    }
}
