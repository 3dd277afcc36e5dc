/// Associates a readiness event with the handle that produced it.
///
/// `Token` is an opaque handle chosen by the caller of [`Epoll::add`] and
/// returned unchanged with every [`Event`] generated for that registration.
///
/// [`Epoll::add`]: struct.Epoll.html#method.add
/// [`Event`]: struct.Event.html
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub usize);

impl From<usize> for Token {
    #[inline]
    fn from(val: usize) -> Token {
        Token(val)
    }
}

impl From<Token> for usize {
    #[inline]
    fn from(val: Token) -> usize {
        val.0
    }
}
