use std::future::Future;

use tracing::debug;

use super::model::GroupMember;
use crate::db::DatabaseError;

fn take<'a, P>(remaining: &mut Vec<&'a GroupMember>, pick: &mut P) -> &'a GroupMember
where
    P: FnMut(usize) -> usize,
{
    let index = pick(remaining.len()).min(remaining.len() - 1);
    remaining.swap_remove(index)
}

/// Draws a partner out of `pool`.
///
/// Candidates are drawn without replacement. A paired first draw is always
/// redrawn once. With `avoid_ntr` the draw continues while the candidate is
/// paired, giving up after `pool.len() + 1` draws or once the pool is spent.
/// Without it the second draw is kept whatever its state.
///
/// `pick(n)` returns an index in `0..n`.
pub(crate) async fn draw_partner<P, F, Fut>(
    pool: &[GroupMember],
    avoid_ntr: bool,
    mut pick: P,
    mut is_paired: F,
) -> Result<Option<GroupMember>, DatabaseError>
where
    P: FnMut(usize) -> usize,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, DatabaseError>>,
{
    if pool.is_empty() {
        return Ok(None);
    }

    let limit = pool.len() + 1;
    let mut remaining: Vec<&GroupMember> = pool.iter().collect();

    let mut selected = take(&mut remaining, &mut pick);
    let mut draws = 1;
    let mut paired = is_paired(selected.user_id.clone()).await?;

    if paired && !remaining.is_empty() {
        selected = take(&mut remaining, &mut pick);
        draws += 1;
        paired = is_paired(selected.user_id.clone()).await?;
    }

    if avoid_ntr {
        while paired {
            if remaining.is_empty() || draws >= limit {
                debug!("no unpaired candidate after {} draws", draws);
                return Ok(None);
            }
            selected = take(&mut remaining, &mut pick);
            draws += 1;
            paired = is_paired(selected.user_id.clone()).await?;
        }
    }

    Ok(Some(selected.clone()))
}
