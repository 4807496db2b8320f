/// The feed screen: toolbar, masonry of cards, end-of-feed sentinel and
/// the variant modal.
use iced::widget::{
    button, center, column, container, horizontal_space, mouse_area, opaque, row, scrollable,
    stack, text, Column, Row,
};
use iced::{Alignment, Color, Element, Length, Theme};

use crate::feed::card::{LayoutSettings, MasonryLayout};
use crate::feed::fetcher::{PaginatedFetcher, QueryKind};
use crate::feed::view::{FeedAction, FeedView, Layout};
use crate::state::data::{Item, UserId};
use crate::state::preferences::PreferenceSnapshot;
use crate::ui::card::{self, CardOptions};
use crate::Message;

/// Borrowed application state needed to draw the feed
pub struct FeedScreen<'a> {
    pub fetcher: &'a PaginatedFetcher,
    pub preferences: &'a PreferenceSnapshot,
    pub visible: &'a [Item],
    pub view: &'a FeedView,
    pub masonry: &'a MasonryLayout,
    pub settings: &'a LayoutSettings,
    pub viewer: Option<UserId>,
    pub show_nsfw: bool,
    pub status: &'a str,
    pub preferences_failed: bool,
    pub padding: f32,
}

pub fn view(screen: FeedScreen<'_>) -> Element<'_, Message> {
    let feed = scrollable(
        column![masonry(&screen), sentinel(&screen)]
            .spacing(screen.settings.gap)
            .padding(screen.padding)
            .width(Length::Fill),
    )
    .on_scroll(Message::Scrolled)
    .width(Length::Fill)
    .height(Length::Fill);

    let base = column![toolbar(&screen), feed].spacing(8).padding([12, 0]);

    if screen.view.is_variant_modal_opened() {
        stack![base, variant_modal(screen.view)].into()
    } else {
        base.into()
    }
}

fn toolbar<'a>(screen: &FeedScreen<'a>) -> Element<'a, Message> {
    let flags = screen.fetcher.flags();

    let layout_label = match screen.view.layout() {
        Layout::Grid => "List view",
        Layout::List => "Grid view",
    };
    let categories_label = match screen.fetcher.query() {
        QueryKind::ByCategory => "All images",
        QueryKind::Infinite => "By category",
    };

    let mut bar = row![
        button(layout_label).on_press(Message::Feed(FeedAction::ToggleLayout)),
        button(categories_label).on_press(Message::ToggleCategories),
        button("Refresh").on_press_maybe((!flags.is_fetching).then_some(Message::Refresh)),
        button("Import Folder")
            .on_press_maybe(screen.viewer.map(|_| Message::ImportFolder))
            .style(button::secondary),
    ]
    .spacing(8)
    .align_y(Alignment::Center);

    if screen.fetcher.query() == QueryKind::ByCategory && screen.fetcher.has_previous_page() {
        let previous = (!flags.is_fetching).then_some(Message::FetchPrevious);
        bar = bar.push(button("Previous category").on_press_maybe(previous));
    }

    let selected = screen.view.selected().len();
    if selected > 0 {
        bar = bar
            .push(text(format!("{} selected", selected)))
            .push(button("Deselect all").on_press(Message::Feed(FeedAction::DeselectAll)));
    }

    bar = bar.push(horizontal_space());
    if flags.is_error || screen.preferences_failed {
        bar = bar.push(
            button("Retry")
                .on_press(Message::Retry)
                .style(button::danger),
        );
    }
    bar = bar.push(text(screen.status).size(14));

    let mut header = column![bar].spacing(4);
    let categories: Vec<&str> = screen
        .fetcher
        .pages()
        .iter()
        .filter_map(|page| page.category.as_ref())
        .map(|category| category.name.as_str())
        .collect();
    if !categories.is_empty() {
        header = header.push(text(format!("Categories: {}", categories.join(", "))).size(13));
    }

    container(header).padding([0, screen.padding as u16]).into()
}

fn masonry<'a>(screen: &FeedScreen<'a>) -> Element<'a, Message> {
    if screen.preferences.loading {
        return text("Loading preferences...").into();
    }

    let layout: &'a MasonryLayout = screen.masonry;
    let columns = layout.columns.iter().map(|indices| {
        let cards = indices.iter().filter_map(|&index| {
            let item = screen.visible.get(index)?;
            let rect = layout.cards.get(index)?;
            let options = CardOptions {
                mounted: screen.view.is_mounted(item.id),
                selected: screen.view.is_selected(item.id),
                viewer: screen.viewer,
                show_nsfw: screen.show_nsfw,
            };
            Some(card::view(item, rect, options))
        });

        Column::with_children(cards)
            .spacing(screen.settings.gap)
            .width(Length::Fixed(layout.column_width))
            .into()
    });

    let grid = Row::with_children(columns).spacing(screen.settings.gap);

    match screen.view.layout() {
        Layout::List => container(grid).center_x(Length::Fill).into(),
        Layout::Grid => grid.into(),
    }
}

fn sentinel<'a>(screen: &FeedScreen<'a>) -> Element<'a, Message> {
    let flags = screen.fetcher.flags();

    let label = if flags.is_error {
        "Something went wrong while loading."
    } else if flags.is_loading || flags.is_fetching {
        "Loading..."
    } else if screen.visible.is_empty() {
        "No images match these filters."
    } else if flags.has_next_page {
        ""
    } else {
        "You have reached the end of the feed."
    };

    container(text(label).size(14))
        .center_x(Length::Fill)
        .padding(24)
        .into()
}

fn variant_modal<'a>(view: &FeedView) -> Element<'a, Message> {
    let ids: Vec<String> = view.selected().iter().map(|id| format!("#{}", id)).collect();

    let dialog = container(
        column![
            text("Create variant").size(24),
            text(format!("Source: {}", ids.join(", "))),
            row![
                horizontal_space(),
                button("Close").on_press(Message::Feed(FeedAction::CloseModal)),
            ],
        ]
        .spacing(16),
    )
    .width(400)
    .padding(20)
    .style(container::rounded_box);

    opaque(
        mouse_area(center(opaque(dialog)).style(|_theme: &Theme| container::Style {
            background: Some(
                Color {
                    a: 0.8,
                    ..Color::BLACK
                }
                .into(),
            ),
            ..container::Style::default()
        }))
        .on_press(Message::Feed(FeedAction::CloseModal)),
    )
}
