use crate::api::{
    ApiResult,
    Prize,
    RaffleApi,
};
use tracing::{
    info,
    warn,
};

pub const NO_DESCRIPTION: &str = "No description";
pub const PRIZE_COST_LABEL: &str = "1 shadow coin";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CatalogStatus {
    Available(usize),
    Exhausted,
    /// The fetch failed and the previous list was kept.
    Unchanged,
}

/// Prizes still available to win.
#[derive(Clone, Debug, Default)]
pub struct PrizeCatalog {
    prizes: Vec<Prize>,
    loaded: bool,
}

impl PrizeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prizes(&self) -> &[Prize] {
        &self.prizes
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_exhausted(&self) -> bool {
        self.loaded && self.prizes.is_empty()
    }

    pub fn draw_enabled(&self) -> bool {
        !self.prizes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Prize> {
        self.prizes.get(index)
    }

    pub fn apply(&mut self, result: ApiResult<Vec<Prize>>) -> CatalogStatus {
        match result {
            Ok(prizes) => {
                info!(count = prizes.len(), "prize catalog loaded");
                self.prizes = prizes;
                self.loaded = true;
                if self.prizes.is_empty() {
                    CatalogStatus::Exhausted
                } else {
                    CatalogStatus::Available(self.prizes.len())
                }
            }
            Err(err) => {
                warn!(%err, "failed to load prize catalog");
                CatalogStatus::Unchanged
            }
        }
    }

    pub async fn refresh<A: RaffleApi>(&mut self, api: &A) -> CatalogStatus {
        let result = api.prizes().await;
        self.apply(result)
    }
}

/// Display fields of the prize-details view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrizeDetails {
    pub name: String,
    pub description: String,
    pub cost: &'static str,
    pub image: String,
}

impl From<&Prize> for PrizeDetails {
    fn from(prize: &Prize) -> Self {
        let description = prize
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(NO_DESCRIPTION)
            .to_string();
        PrizeDetails {
            name: prize.name.clone(),
            description,
            cost: PRIZE_COST_LABEL,
            image: prize.image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        error::ApiError,
        test_helpers::{
            FakeRaffleApi,
            catalog,
        },
    };

    #[tokio::test]
    async fn refresh__stores_prizes_and_enables_draw() {
        // given
        let api = FakeRaffleApi::new();
        api.set_prizes(Ok(catalog(&["A", "B"])));
        let mut prizes = PrizeCatalog::new();

        // when
        let status = prizes.refresh(&api).await;

        // then
        assert_eq!(status, CatalogStatus::Available(2));
        assert!(prizes.draw_enabled());
        assert_eq!(prizes.get(1).unwrap().name, "B");
    }

    #[tokio::test]
    async fn refresh__empty_list_disables_draw() {
        let api = FakeRaffleApi::new();
        let mut prizes = PrizeCatalog::new();

        let status = prizes.refresh(&api).await;

        assert_eq!(status, CatalogStatus::Exhausted);
        assert!(prizes.is_exhausted());
        assert!(!prizes.draw_enabled());
    }

    #[test]
    fn apply__failure_keeps_previous_prizes() {
        // given
        let mut prizes = PrizeCatalog::new();
        prizes.apply(Ok(catalog(&["A"])));

        // when
        let status = prizes.apply(Err(ApiError::Connection("down".into())));

        // then
        assert_eq!(status, CatalogStatus::Unchanged);
        assert_eq!(prizes.prizes().len(), 1);
    }

    #[test]
    fn prize_details__falls_back_when_description_missing() {
        let mut prize = catalog(&["Lamp"]).remove(0);
        let details = PrizeDetails::from(&prize);
        assert_eq!(details.description, NO_DESCRIPTION);
        assert_eq!(details.cost, "1 shadow coin");

        prize.description = Some("Warm light".into());
        assert_eq!(PrizeDetails::from(&prize).description, "Warm light");
    }
}
