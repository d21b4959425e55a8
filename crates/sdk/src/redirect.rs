/// Navigation hook fired when the session can no longer be recovered.
///
/// The client only guarantees that credentials are already cleared by the time
/// this runs; what "sign-in" means is up to the embedding application.
pub trait SignInRedirect: Send + Sync {
    fn redirect_to_sign_in(&self);
}

impl<F> SignInRedirect for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_sign_in(&self) {
        self()
    }
}

/// Does nothing. For headless use where the caller inspects the returned error instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRedirect;

impl SignInRedirect for NoRedirect {
    fn redirect_to_sign_in(&self) {}
}
