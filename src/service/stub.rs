//! Typed call wrappers.

/// Declare a typed wrapper over [`RpcClient`](crate::service::client::RpcClient).
///
/// Each entry becomes an async method whose parameters are sent as named
/// arguments of the same name.
///
/// ```
/// rpc_protocol::rpc_stub! {
///     /// Account service calls
///     pub struct Accounts {
///         fn whoami => "whoami"();
///         fn set_shell => "chsh"(user: &str, shell: &str);
///     }
/// }
/// ```
#[macro_export]
macro_rules! rpc_stub {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fn_meta:meta])*
                fn $method:ident => $function:literal ( $($arg:ident : $ty:ty),* $(,)? );
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name<'a, R, W> {
            client: &'a mut $crate::service::client::RpcClient<R, W>,
        }

        impl<'a, R, W> $name<'a, R, W>
        where
            R: $crate::protocol::peer::RpcRead,
            W: $crate::protocol::peer::RpcWrite,
        {
            pub fn new(client: &'a mut $crate::service::client::RpcClient<R, W>) -> Self {
                Self { client }
            }

            $(
                $(#[$fn_meta])*
                pub async fn $method(
                    &mut self,
                    $($arg: $ty),*
                ) -> $crate::error::Result<$crate::protocol::message::Response> {
                    #[allow(unused_mut)]
                    let mut call = $crate::protocol::message::Call::new($function);
                    $(
                        call = call.arg(
                            stringify!($arg),
                            $crate::protocol::message::to_value(&$arg)?,
                        );
                    )*
                    self.client.invoke(call).await
                }
            )*
        }
    };
}
