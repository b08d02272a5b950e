use crate::catalog::Catalog;

/// Package id → display name for every app the upstream catalogs target.
/// Both lookup directions read this one table.
const KNOWN_APPS: &[(&str, &str)] = &[
    ("com.crunchyroll.crunchyroid", "Crunchyroll"),
    ("com.google.android.youtube", "Youtube"),
    ("com.amazon.mShop.android.shopping", "Amazon Shopping"),
    ("tv.twitch.android.app", "Twitch"),
    ("com.google.android.apps.youtube.music", "Youtube Music"),
    ("it.ipzs.cieid", "CieID"),
    ("com.twitter.android", "Twitter"),
    ("com.spotify.music", "Spotify"),
    ("com.tumblr", "Tumblr"),
    ("com.laurencedawson.reddit_sync", "Sync for Reddit"),
    ("com.duolingo", "Duolingo"),
    ("com.myprog.hexedit", "HEX Editor"),
    ("com.rubenmayayo.reddit", "Boost for Reddit"),
    ("o.o.joey", "Joey for Reddit"),
    ("io.syncapps.lemmy_sync", "Sync for Lemmy"),
    ("com.ss.android.ugc.trill", "TikTok (Asia)"),
    ("com.adobe.lrmobile", "Lightroom"),
    ("com.reddit.frontpage", "Reddit"),
    ("com.strava", "Strava"),
    ("com.facebook.orca", "Messenger"),
    ("com.soundcloud.android", "SoundCloud"),
    ("com.piccomaeurope.fr", "Piccoma"),
    ("com.google.android.apps.magazines", "Google News"),
    ("com.spotify.lite", "Spotify Lite"),
    ("de.simon.openinghours", "Opening Hours"),
    ("com.xiaomi.wearable", "Mi Fitness"),
    ("com.google.android.apps.photos", "Google Photos"),
    ("com.facebook.katana", "Facebook"),
    ("com.nis.app", "Inshorts"),
    ("com.instagram.android", "Instagram"),
    ("com.myfitnesspal.android", "MyFitnessPal"),
    ("jp.pxv.android", "Pixiv"),
    ("at.willhaben", "Willhaben"),
    ("de.stocard.stocard", "Stocard"),
    ("com.rarlab.rar", "WinRAR"),
    ("com.microblink.photomath", "Photomath"),
    ("com.backdrops.wallpapers", "Backdrops Wallpapers"),
    ("de.dwd.warnapp", "WarnWetter"),
    ("com.swisssign.swissid.mobile", "SwissID"),
    ("net.binarymode.android.irplus", "Irplus - Infrared Remote"),
    ("com.sony.songpal.mdr", "Sony | Sound Connect"),
    ("at.gv.bmf.bmf2go", "FinanzOnline"),
    ("eu.faircode.netguard", "NetGuard - no-root firewall"),
    ("com.google.android.apps.recorder", "Recorder"),
    ("pl.solidexplorer2", "Solid Explorer File Manager"),
    ("com.bandcamp.android", "Bandcamp"),
    ("at.gv.oe.app", "Digitales Amt"),
    ("at.gv.bka.serviceportal", "SPB Serviceportal Bund"),
    ("de.tudortmund.app", "TU Dortmund"),
    ("com.onelouder.baconreader", "BaconReader for Reddit"),
    ("ml.docilealligator.infinityforreddit", "Infinity for Reddit"),
    ("com.andrewshu.android.reddit", "Rif is fun for Reddit"),
    ("free.reddit.news", "Relay for Reddit"),
    ("me.ccrama.redditslide", "Slide for Reddit"),
    ("io.yuka.android", "Yuka Food & Cosmetic Scanner"),
    ("ginlemon.iconpackstudio", "Icon Pack Studio"),
    ("com.zombodroid.MemeGenerator", "Meme Generator"),
    ("org.totschnig.myexpenses", "My Expenses"),
    ("com.wakdev.apps.nfctools.se", "NFC Tools"),
    ("tv.trakt.trakt", "Trakt"),
    ("co.windyapp.android", "Windy.app"),
    ("com.ticktick.task", "TickTick - Todo & Task List"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppEntry {
    pub package_id: &'static str,
    pub display_name: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct AppDirectory {
    entries: &'static [(&'static str, &'static str)],
}

impl Default for AppDirectory {
    fn default() -> Self {
        Self {
            entries: KNOWN_APPS,
        }
    }
}

impl AppDirectory {
    pub fn entries(&self) -> impl Iterator<Item = AppEntry> + '_ {
        self.entries
            .iter()
            .map(|&(package_id, display_name)| AppEntry {
                package_id,
                display_name,
            })
    }

    pub fn package_for(&self, display_name: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, name)| *name == display_name)
            .map(|(package, _)| *package)
    }

    pub fn display_name_for(&self, package_id: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(package, _)| *package == package_id)
            .map(|(_, name)| *name)
    }

    /// Display names of every known app that any patch in the catalog lists
    /// as compatible, sorted.
    pub fn supported_apps(&self, catalog: &Catalog) -> Vec<&'static str> {
        let mut apps: Vec<&'static str> = self
            .entries()
            .filter(|entry| {
                catalog.patches().iter().any(|patch| {
                    patch
                        .compatible_packages
                        .iter()
                        .any(|compatible| compatible.name == entry.package_id)
                })
            })
            .map(|entry| entry.display_name)
            .collect();
        apps.sort_unstable();
        apps.dedup();
        apps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CompatiblePackage, PatchDescriptor};
    use std::collections::HashSet;

    #[test]
    fn both_directions_are_unique() {
        let directory = AppDirectory::default();
        let packages: HashSet<_> = directory.entries().map(|entry| entry.package_id).collect();
        let names: HashSet<_> = directory.entries().map(|entry| entry.display_name).collect();
        assert_eq!(packages.len(), KNOWN_APPS.len());
        assert_eq!(names.len(), KNOWN_APPS.len());

        for entry in directory.entries() {
            assert_eq!(directory.package_for(entry.display_name), Some(entry.package_id));
            assert_eq!(directory.display_name_for(entry.package_id), Some(entry.display_name));
        }
    }

    #[test]
    fn unknown_name_has_no_package() {
        assert_eq!(AppDirectory::default().package_for("Not An App"), None);
    }

    #[test]
    fn supported_apps_consider_every_compatible_entry() {
        let patch = PatchDescriptor {
            name: "Hide ads".to_string(),
            compatible_packages: vec![
                CompatiblePackage::new("com.reddit.frontpage", &[]),
                CompatiblePackage::new("com.google.android.youtube", &["19.16.39"]),
                CompatiblePackage::new("com.example.unknown", &[]),
            ],
            ..PatchDescriptor::default()
        };
        let catalog = Catalog::from_patches(vec![patch.clone(), patch]);

        assert_eq!(
            AppDirectory::default().supported_apps(&catalog),
            vec!["Reddit", "Youtube"]
        );
    }
}
