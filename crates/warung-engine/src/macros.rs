//! Internal macros.

/// Runs `$body` against a fresh write scope under the request guard, then
/// commits outside the race and evaluates to the body's value.
///
/// ```rust,ignore
/// let movement = write_scope!(self, ctx, "restock", |scope| {
///     self.db.inventory().restock_in(&mut scope, input, ctx.actor()).await
/// });
/// ```
///
/// A token or deadline that fires while `$body` runs drops the scope, which
/// rolls it back. Once `$body` has returned, the commit always runs to
/// completion, so `Cancelled` never hides a landed write.
macro_rules! write_scope {
    ($engine:expr, $ctx:expr, $op:literal, |$scope:ident| $body:expr) => {{
        let engine = $engine;
        let ctx = $ctx;
        let (committed, value) = engine
            .guard(ctx, $op, async {
                #[allow(unused_mut)]
                let mut $scope = engine.db.begin(::warung_db::ScopeMode::Write).await?;
                let written: $crate::error::EngineResult<_> =
                    async { $body.map_err($crate::error::EngineError::from) }.await;
                $crate::engine::keep_or_abandon($scope, written).await
            })
            .await?;
        engine.commit(ctx, committed).await?;
        value
    }};
}
